use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

use super::cache_admin::CacheAdminError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    CacheAdmin(#[from] CacheAdminError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the operator CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Configuration(_) | AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::CacheAdmin(CacheAdminError::InvalidIdentity) => 64,
            AppError::Infra(_) | AppError::Unexpected(_) => 1,
        }
    }
}
