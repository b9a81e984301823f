use thiserror::Error;
use uuid::Uuid;

use super::entity::{EntityType, Operation};

/// Opaque reference to the transport exchange that produced a remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub request_id: Uuid,
    pub target: String,
}

impl TransportHandle {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity type `{entity_type}` is not supported")]
    UnsupportedType { entity_type: EntityType },
    #[error("invalid entity id: {reason}")]
    InvalidId { reason: String },
    #[error("entity type `{entity_type}` has no `{operation}` handler")]
    MissingHandler {
        entity_type: EntityType,
        operation: Operation,
    },
    #[error("handler does not implement `{operation}`")]
    Unimplemented { operation: Operation },
    #[error("primary key for entity type `{entity_type}` could not be resolved")]
    UnresolvedPrimaryKey { entity_type: EntityType },
    #[error("malformed entity payload: {message}")]
    Malformed { message: String },
    #[error(
        "remote call to {target} failed ({status_text}): {message}",
        target = .handle.target,
        status_text = describe_status(.status)
    )]
    Remote {
        handle: TransportHandle,
        status: Option<u16>,
        message: String,
    },
    #[error("request was dropped before any callback fired")]
    Abandoned,
}

impl EntityError {
    pub fn unsupported(entity_type: impl Into<EntityType>) -> Self {
        Self::UnsupportedType {
            entity_type: entity_type.into(),
        }
    }

    pub fn invalid_id(reason: impl Into<String>) -> Self {
        Self::InvalidId {
            reason: reason.into(),
        }
    }

    pub fn missing_handler(entity_type: impl Into<EntityType>, operation: Operation) -> Self {
        Self::MissingHandler {
            entity_type: entity_type.into(),
            operation,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn remote(
        handle: TransportHandle,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Remote {
            handle,
            status,
            message: message.into(),
        }
    }

    /// HTTP-style status carried by a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_renders_target_and_status() {
        let err = EntityError::remote(
            TransportHandle::new("https://cms.example/api/node/4.json"),
            Some(404),
            "Not found",
        );
        let text = err.to_string();
        assert!(text.contains("https://cms.example/api/node/4.json"));
        assert!(text.contains("404"));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn remote_error_without_status() {
        let err = EntityError::remote(TransportHandle::new("mock"), None, "connection reset");
        assert!(err.to_string().contains("no status"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn declared_failures_name_the_type() {
        let err = EntityError::unsupported("unknown_type");
        assert_eq!(
            err.to_string(),
            "entity type `unknown_type` is not supported"
        );

        let err = EntityError::missing_handler("node", Operation::Update);
        assert_eq!(err.to_string(), "entity type `node` has no `update` handler");
    }
}
