//! Error types for the SCIM client crate.

use thiserror::Error;
use uuid::Uuid;

/// SCIM client errors.
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Token signing failed.
    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    /// No active signing key exists for the tenant.
    #[error("No active signing key for tenant {tenant_id}")]
    MissingSigningKey { tenant_id: Uuid },

    /// Database error while loading signing material.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for SCIM client operations.
pub type ScimClientResult<T> = Result<T, ScimClientError>;
