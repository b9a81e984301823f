use thiserror::Error;

use crate::{config::LoadError, domain::EntityError, infra::error::InfraError};

/// Failure of a command-line run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Config(_) => 2,
            AppError::Entity(EntityError::UnsupportedType { .. })
            | AppError::Entity(EntityError::InvalidId { .. }) => 2,
            _ => 1,
        }
    }
}
