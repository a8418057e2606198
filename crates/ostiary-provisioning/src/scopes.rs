//! Scope/operation policy.
//!
//! Maps operation kinds to the scopes a destination's client application
//! must hold, validates applications against enabled operation sets, and
//! provisions the named SCIM scopes per tenant.

use std::collections::BTreeSet;

use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use ostiary_db::models::{ClientApplication, ScimScope};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::operation::OperationKind;

/// Scope granting read access to downstream users.
pub const SCOPE_USERS_READ: &str = "scim:users:read";

/// Scope granting write access to downstream users.
pub const SCOPE_USERS_WRITE: &str = "scim:users:write";

/// Scope granting read access to downstream groups.
pub const SCOPE_GROUPS_READ: &str = "scim:groups:read";

/// Scope granting write access to downstream groups and memberships.
pub const SCOPE_GROUPS_WRITE: &str = "scim:groups:write";

/// All named SCIM scopes a tenant carries.
pub const ALL_SCOPES: [&str; 4] = [
    SCOPE_USERS_READ,
    SCOPE_USERS_WRITE,
    SCOPE_GROUPS_READ,
    SCOPE_GROUPS_WRITE,
];

/// The scope required to perform one operation kind.
#[must_use]
pub fn required_scope(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::CreateUser
        | OperationKind::UpdateUser
        | OperationKind::DeactivateUser
        | OperationKind::DeleteUser => SCOPE_USERS_WRITE,
        OperationKind::CreateGroup
        | OperationKind::UpdateGroup
        | OperationKind::DeleteGroup
        | OperationKind::AddGroupMember
        | OperationKind::RemoveGroupMember => SCOPE_GROUPS_WRITE,
    }
}

/// The scope set required to perform a set of operations.
#[must_use]
pub fn required_scopes<I>(operations: I) -> BTreeSet<&'static str>
where
    I: IntoIterator<Item = OperationKind>,
{
    operations.into_iter().map(required_scope).collect()
}

/// Scope validation and provisioning over the persistent stores.
#[derive(Clone)]
pub struct ScopePolicy {
    pool: PgPool,
}

impl ScopePolicy {
    /// Create a policy over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The required scopes an application does not hold, for the given
    /// operation set. Empty means the application is sufficient.
    pub async fn missing_scopes(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        operations: &[OperationKind],
    ) -> ProvisioningResult<Vec<String>> {
        let application = ClientApplication::get_by_id(&self.pool, tenant_id, application_id)
            .await?
            .ok_or(ProvisioningError::ApplicationNotFound { id: application_id })?;

        let held: BTreeSet<String> = application.scope_names().into_iter().collect();
        let missing = required_scopes(operations.iter().copied())
            .into_iter()
            .filter(|scope| !held.contains(*scope))
            .map(str::to_string)
            .collect();

        Ok(missing)
    }

    /// Whether the application's scope set covers the operations.
    pub async fn validate_application(
        &self,
        tenant_id: Uuid,
        application_id: Uuid,
        operations: &[OperationKind],
    ) -> ProvisioningResult<bool> {
        Ok(self
            .missing_scopes(tenant_id, application_id, operations)
            .await?
            .is_empty())
    }

    /// Create any missing named SCIM scopes for the tenant.
    ///
    /// Idempotent: returns the number of scopes created this call (four on
    /// first invocation, zero afterwards).
    #[instrument(skip(self))]
    pub async fn ensure_tenant_scopes(&self, tenant_id: Uuid) -> ProvisioningResult<usize> {
        let mut created = 0;
        for scope in ALL_SCOPES {
            if ScimScope::ensure(&self.pool, tenant_id, scope).await? {
                created += 1;
            }
        }

        if created > 0 {
            debug!(
                target: "scim_delivery",
                tenant_id = %tenant_id,
                created,
                "Provisioned SCIM scopes for tenant"
            );
        }

        Ok(created)
    }
}
