//! REST transport for Services-style endpoints.
//!
//! Each entity type maps onto `{base}/{endpoint}/{type}` resources:
//!
//! | Operation | Request |
//! |---|---|
//! | retrieve | `GET {type}/{id}.json` |
//! | create | `POST {type}.json` |
//! | update | `PUT {type}/{id}.json` |
//! | delete | `DELETE {type}/{id}.json` |
//! | index | `GET {query_key}` |

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::debug;

use crate::application::{CallOptions, EntityHandler, HandlerRegistry};
use crate::domain::{Entity, EntityError, EntityType, Operation, TransportHandle};

use super::error::InfraError;

/// Shared HTTP client rooted at one endpoint.
pub struct RestTransport {
    client: Client,
    root: Url,
    runtime: Handle,
}

impl RestTransport {
    /// Build a transport for `{base_url}/{endpoint}/`.
    ///
    /// Must be called from inside a tokio runtime; handler calls are spawned
    /// onto it.
    pub fn new(base_url: &Url, endpoint: &str, timeout: Duration) -> Result<Self, InfraError> {
        let runtime = Handle::try_current()
            .map_err(|err| InfraError::transport(format!("no tokio runtime available: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::transport(format!("failed to build HTTP client: {err}")))?;
        let root = endpoint_root(base_url, endpoint)?;
        Ok(Self {
            client,
            root,
            runtime,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("entity-relay/", env!("CARGO_PKG_VERSION"))
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Register a [`RestEntityHandler`] for each `(type, primary key)` pair.
    ///
    /// A `None` primary key defers to the built-in table.
    pub fn register_all<'a>(
        self: &Arc<Self>,
        registry: &mut HandlerRegistry,
        entity_types: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    ) {
        for (entity_type, primary_key) in entity_types {
            let mut handler = RestEntityHandler::new(Arc::clone(self), entity_type);
            if let Some(primary_key) = primary_key {
                handler = handler.with_primary_key(primary_key);
            }
            registry.register(entity_type, Arc::new(handler));
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, EntityError> {
        let url = self.root.join(path).map_err(|err| {
            EntityError::remote(TransportHandle::new(path), None, format!("invalid URL: {err}"))
        })?;
        let handle = TransportHandle::new(url.as_str());
        debug!(
            request_id = %handle.request_id,
            method = %method,
            url = %url,
            "sending entity request"
        );

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|err| {
            EntityError::remote(
                handle.clone(),
                err.status().map(|status| status.as_u16()),
                err.to_string(),
            )
        })?;
        Self::handle(handle, response).await
    }

    async fn handle(handle: TransportHandle, response: Response) -> Result<Value, EntityError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| {
            EntityError::remote(handle.clone(), Some(status.as_u16()), err.to_string())
        })?;

        if !status.is_success() {
            let message = error_message(&bytes)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("status {status}"));
            return Err(EntityError::remote(handle, Some(status.as_u16()), message));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            EntityError::remote(
                handle,
                Some(status.as_u16()),
                format!("failed to parse body: {err}"),
            )
        })
    }
}

/// Remote handler for one entity type.
pub struct RestEntityHandler {
    transport: Arc<RestTransport>,
    entity_type: EntityType,
    primary_key: Option<String>,
}

impl RestEntityHandler {
    pub fn new(transport: Arc<RestTransport>, entity_type: impl Into<EntityType>) -> Self {
        Self {
            transport,
            entity_type: entity_type.into(),
            primary_key: None,
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    fn collection_path(&self) -> String {
        format!("{}.json", self.entity_type)
    }

    fn resource_path(&self, id: i64) -> String {
        format!("{}/{id}.json", self.entity_type)
    }

    /// Resource path for an entity that carries its own id.
    fn update_path(&self, entity: &Entity) -> Result<String, EntityError> {
        let key = self
            .primary_key
            .as_deref()
            .or_else(|| crate::domain::builtin_primary_key(self.entity_type.as_str()))
            .ok_or_else(|| EntityError::UnresolvedPrimaryKey {
                entity_type: self.entity_type.clone(),
            })?;
        let id = entity.primary_key_value(key).ok_or_else(|| {
            EntityError::malformed(format!("update payload has no `{key}` value"))
        })?;
        Ok(self.resource_path(id))
    }

    /// Run `request` on the transport runtime and settle `call` with its outcome.
    fn spawn<T, F>(&self, call: CallOptions<T>, request: F)
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EntityError>> + Send + 'static,
    {
        self.transport.runtime.spawn(async move {
            match request.await {
                Ok(value) => call.succeed(value),
                Err(err) => call.fail(err),
            }
        });
    }
}

impl EntityHandler for RestEntityHandler {
    fn retrieve(&self, id: i64, call: CallOptions<Entity>) {
        let transport = Arc::clone(&self.transport);
        let path = self.resource_path(id);
        self.spawn(call, async move {
            let body = transport.send(Method::GET, &path, None).await?;
            Entity::try_from(body)
        });
    }

    fn create(&self, entity: Entity, call: CallOptions<Value>) {
        let transport = Arc::clone(&self.transport);
        let path = self.collection_path();
        self.spawn(call, async move {
            transport
                .send(Method::POST, &path, Some(entity.into_value()))
                .await
        });
    }

    fn update(&self, entity: Entity, call: CallOptions<Value>) {
        let path = match self.update_path(&entity) {
            Ok(path) => path,
            Err(err) => {
                call.fail(err);
                return;
            }
        };
        let transport = Arc::clone(&self.transport);
        self.spawn(call, async move {
            transport
                .send(Method::PUT, &path, Some(entity.into_value()))
                .await
        });
    }

    fn delete(&self, id: i64, call: CallOptions<Value>) {
        let transport = Arc::clone(&self.transport);
        let path = self.resource_path(id);
        self.spawn(call, async move {
            transport.send(Method::DELETE, &path, None).await
        });
    }

    fn index(&self, query_key: &str, call: CallOptions<Vec<Entity>>) {
        let transport = Arc::clone(&self.transport);
        let path = query_key.trim_start_matches('/').to_string();
        self.spawn(call, async move {
            let body = transport.send(Method::GET, &path, None).await?;
            entity_list(body)
        });
    }

    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }
}

fn endpoint_root(base_url: &Url, endpoint: &str) -> Result<Url, InfraError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let endpoint = endpoint.trim_matches('/');
    if endpoint.is_empty() {
        return Ok(base);
    }
    base.join(&format!("{endpoint}/"))
        .map_err(|err| InfraError::configuration(format!("invalid remote endpoint: {err}")))
}

/// Services endpoints report errors as a JSON array of strings.
fn error_message(bytes: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(items)) => {
            let parts: Vec<String> = items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Ok(Value::String(text)) => Some(text),
        Ok(other) => Some(other.to_string()),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
    }
}

/// Index responses are either a JSON array or an object keyed by id.
fn entity_list(body: Value) -> Result<Vec<Entity>, EntityError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(EntityError::malformed(format!(
                "expected a list of entities, got {other}"
            )));
        }
    };
    items.into_iter().map(Entity::try_from).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn endpoint_root_normalizes_slashes() {
        let base = Url::parse("https://cms.example/site").unwrap();
        assert_eq!(
            endpoint_root(&base, "/api/").unwrap().as_str(),
            "https://cms.example/site/api/"
        );

        let base = Url::parse("https://cms.example/").unwrap();
        assert_eq!(
            endpoint_root(&base, "").unwrap().as_str(),
            "https://cms.example/"
        );
    }

    #[test]
    fn error_message_prefers_services_array() {
        assert_eq!(
            error_message(br#"["Node 4 not found"]"#).as_deref(),
            Some("Node 4 not found")
        );
        assert_eq!(error_message(b"plain failure").as_deref(), Some("plain failure"));
        assert_eq!(error_message(b"").as_deref(), None);
    }

    #[test]
    fn entity_list_accepts_arrays_and_keyed_objects() {
        let listed = entity_list(json!([{"nid": 1}, {"nid": 2}])).unwrap();
        assert_eq!(listed.len(), 2);

        let keyed = entity_list(json!({"1": {"nid": 1}})).unwrap();
        assert_eq!(keyed[0].primary_key_value("nid"), Some(1));

        assert!(entity_list(json!("nope")).is_err());
        assert!(entity_list(json!([1])).is_err());
    }
}
