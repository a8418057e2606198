//! Error types for the provisioning engine.

use thiserror::Error;
use uuid::Uuid;

/// Provisioning engine errors.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SCIM client error.
    #[error("SCIM client error: {0}")]
    ScimClient(#[from] ostiary_scim_client::ScimClientError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Destination not found.
    #[error("Destination not found: {id}")]
    DestinationNotFound { id: Uuid },

    /// Client application not found.
    #[error("Client application not found: {id}")]
    ApplicationNotFound { id: Uuid },

    /// The client application lacks scopes required by the enabled
    /// operations.
    #[error("Client application {application_id} is missing required scopes: {}", scopes.join(", "))]
    MissingScopes {
        application_id: Uuid,
        scopes: Vec<String>,
    },

    /// Destination validation failed.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// A destination with this name already exists in the tenant.
    #[error("Destination name already in use: {name}")]
    DuplicateName { name: String },

    /// The configured event processor is not available in this build.
    #[error("Unsupported event processor: {kind}")]
    UnsupportedProcessor { kind: String },
}

/// Result type for provisioning operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
