//! Destination service facade.
//!
//! Thin coordinator for destination lifecycle: validates input, ensures
//! tenant scopes exist, binds or auto-provisions the client application,
//! and maintains the invariant that a destination's application always
//! holds every scope its enabled operations require.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use ostiary_db::models::{
    ClientApplication, CreateClientApplication, CreateDestination, Delivery, Destination,
    ResourceMapping, UpdateDestination,
};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::operation::{operations_to_value, DeleteAction, OperationKind};
use crate::retry::RetryPolicy;
use crate::scopes::{required_scopes, ScopePolicy};

/// Input for creating a destination.
#[derive(Debug, Clone)]
pub struct DestinationCreateRequest {
    pub tenant_id: Uuid,
    pub name: String,
    pub base_url: String,
    /// Custom attribute mapping; `None` selects the defaults.
    pub attribute_mapping: Option<serde_json::Value>,
    pub enabled_operations: Vec<OperationKind>,
    pub delete_action: DeleteAction,
    /// Retry policy; `None` selects the defaults.
    pub retry_policy: Option<RetryPolicy>,
    pub enabled: bool,
    /// Existing client application to bind. `None` auto-provisions one
    /// with exactly the required scopes.
    pub client_app_id: Option<Uuid>,
}

/// A created destination, with the auto-provisioned client secret.
///
/// The secret is returned exactly once; it is stored only as a hash and
/// can never be read back.
#[derive(Debug)]
pub struct DestinationCreated {
    pub destination: Destination,
    pub client_secret: Option<String>,
}

/// Input for updating a destination. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct DestinationUpdateRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub attribute_mapping: Option<serde_json::Value>,
    pub enabled_operations: Option<Vec<OperationKind>>,
    pub delete_action: Option<DeleteAction>,
    pub retry_policy: Option<RetryPolicy>,
    pub enabled: Option<bool>,
}

/// Destination lifecycle coordinator.
#[derive(Clone)]
pub struct DestinationService {
    pool: PgPool,
    scopes: ScopePolicy,
}

impl DestinationService {
    /// Create a service over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let scopes = ScopePolicy::new(pool.clone());
        Self { pool, scopes }
    }

    /// Create a destination.
    ///
    /// With `client_app_id` set, the application must already hold every
    /// scope the enabled operations require; otherwise the error lists the
    /// missing scopes. Without it, a client application named
    /// `"<name> SCIM Client"` is created with exactly the required scopes
    /// and a fresh secret that is returned once.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, name = %request.name))]
    pub async fn create(
        &self,
        request: DestinationCreateRequest,
    ) -> ProvisioningResult<DestinationCreated> {
        validate_name_and_url(&request.name, &request.base_url)?;

        self.scopes.ensure_tenant_scopes(request.tenant_id).await?;

        let (client_app_id, client_secret) = match request.client_app_id {
            Some(application_id) => {
                let missing = self
                    .scopes
                    .missing_scopes(request.tenant_id, application_id, &request.enabled_operations)
                    .await?;
                if !missing.is_empty() {
                    return Err(ProvisioningError::MissingScopes {
                        application_id,
                        scopes: missing,
                    });
                }
                (application_id, None)
            }
            None => {
                let secret = generate_client_secret();
                let scope_names: Vec<serde_json::Value> =
                    required_scopes(request.enabled_operations.iter().copied())
                        .into_iter()
                        .map(|s| serde_json::Value::String(s.to_string()))
                        .collect();

                let application = ClientApplication::create(
                    &self.pool,
                    &CreateClientApplication {
                        tenant_id: request.tenant_id,
                        name: format!("{} SCIM Client", request.name),
                        secret_hash: hash_secret(&secret),
                        scopes: serde_json::Value::Array(scope_names),
                    },
                )
                .await?;

                info!(
                    target: "scim_delivery",
                    application_id = %application.id,
                    tenant_id = %request.tenant_id,
                    "Auto-provisioned client application for destination"
                );

                (application.id, Some(secret))
            }
        };

        let destination = Destination::create(
            &self.pool,
            &CreateDestination {
                tenant_id: request.tenant_id,
                client_app_id,
                name: request.name.clone(),
                base_url: request.base_url,
                attribute_mapping: request
                    .attribute_mapping
                    .unwrap_or_else(|| serde_json::json!({})),
                enabled_operations: operations_to_value(&request.enabled_operations),
                delete_action: request.delete_action.as_str().to_string(),
                retry_policy: request.retry_policy.unwrap_or_default().to_value(),
                enabled: request.enabled,
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ProvisioningError::DuplicateName { name: request.name }
            } else {
                ProvisioningError::Database(e)
            }
        })?;

        info!(
            target: "scim_delivery",
            destination_id = %destination.id,
            tenant_id = %destination.tenant_id,
            "Destination created"
        );

        Ok(DestinationCreated {
            destination,
            client_secret,
        })
    }

    /// Update a destination in place.
    ///
    /// When the enabled operation set changes, the bound application is
    /// re-validated against the new required scopes.
    #[instrument(skip(self, request), fields(destination_id = %id))]
    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: DestinationUpdateRequest,
    ) -> ProvisioningResult<Destination> {
        let existing = Destination::get_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(ProvisioningError::DestinationNotFound { id })?;

        if let Some(operations) = &request.enabled_operations {
            let missing = self
                .scopes
                .missing_scopes(tenant_id, existing.client_app_id, operations)
                .await?;
            if !missing.is_empty() {
                return Err(ProvisioningError::MissingScopes {
                    application_id: existing.client_app_id,
                    scopes: missing,
                });
            }
        }

        if let Some(url) = &request.base_url {
            validate_name_and_url(request.name.as_deref().unwrap_or(&existing.name), url)?;
        }

        let update = UpdateDestination {
            name: request.name,
            base_url: request.base_url,
            attribute_mapping: request.attribute_mapping,
            enabled_operations: request.enabled_operations.as_deref().map(operations_to_value),
            delete_action: request.delete_action.map(|a| a.as_str().to_string()),
            retry_policy: request.retry_policy.map(|p| p.to_value()),
            enabled: request.enabled,
        };

        Destination::update(&self.pool, tenant_id, id, &update)
            .await?
            .ok_or(ProvisioningError::DestinationNotFound { id })
    }

    /// Delete a destination.
    ///
    /// Resource mappings are removed; historical delivery records are
    /// retained. Returns true if the destination existed.
    #[instrument(skip(self), fields(destination_id = %id))]
    pub async fn delete(&self, tenant_id: Uuid, id: Uuid) -> ProvisioningResult<bool> {
        let removed_mappings = ResourceMapping::delete_by_destination(&self.pool, id).await?;
        let deleted = Destination::delete(&self.pool, tenant_id, id).await?;

        if deleted {
            info!(
                target: "scim_delivery",
                destination_id = %id,
                removed_mappings,
                "Destination deleted"
            );
        }

        Ok(deleted)
    }

    /// Fetch a destination by id.
    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> ProvisioningResult<Destination> {
        Destination::get_by_id(&self.pool, tenant_id, id)
            .await?
            .ok_or(ProvisioningError::DestinationNotFound { id })
    }

    /// List a tenant's destinations, newest first.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ProvisioningResult<Vec<Destination>> {
        Ok(Destination::list_by_tenant(&self.pool, tenant_id, limit, offset).await?)
    }

    /// List delivery records for a destination, newest first.
    pub async fn list_deliveries(
        &self,
        destination_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ProvisioningResult<Vec<Delivery>> {
        Ok(Delivery::list_by_destination(&self.pool, destination_id, limit, offset).await?)
    }

    /// Total delivery records for a destination.
    pub async fn count_deliveries(&self, destination_id: Uuid) -> ProvisioningResult<i64> {
        Ok(Delivery::count_by_destination(&self.pool, destination_id).await?)
    }
}

fn validate_name_and_url(name: &str, base_url: &str) -> ProvisioningResult<()> {
    if name.trim().is_empty() {
        return Err(ProvisioningError::InvalidDestination(
            "name must not be empty".to_string(),
        ));
    }
    if base_url.trim().is_empty() {
        return Err(ProvisioningError::InvalidDestination(
            "base URL must not be empty".to_string(),
        ));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ProvisioningError::InvalidDestination(format!(
            "base URL must be absolute: {base_url}"
        )));
    }
    Ok(())
}

/// Generate a client secret from 32 CSPRNG bytes, hex-encoded.
#[must_use]
fn generate_client_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a client secret for storage. The plaintext cannot be recovered.
#[must_use]
fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_name() {
        assert!(validate_name_and_url("", "https://scim.example.com").is_err());
        assert!(validate_name_and_url("   ", "https://scim.example.com").is_err());
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        assert!(validate_name_and_url("Payroll", "").is_err());
        assert!(validate_name_and_url("Payroll", "scim.example.com/v2").is_err());
    }

    #[test]
    fn test_validate_accepts_absolute_urls() {
        assert!(validate_name_and_url("Payroll", "https://scim.example.com/v2").is_ok());
        assert!(validate_name_and_url("Payroll", "http://localhost:8080").is_ok());
    }

    #[test]
    fn test_generated_secrets_are_unique_and_hex() {
        let a = generate_client_secret();
        let b = generate_client_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_deterministic_and_not_plaintext() {
        let secret = "super-secret";
        let hash = hash_secret(secret);
        assert_eq!(hash, hash_secret(secret));
        assert_ne!(hash, secret);
        assert_eq!(hash.len(), 64);
    }
}
