//! Per-attempt delivery execution.
//!
//! A worker takes one claimed delivery and drives it to a terminal or
//! retrying state: resolve the operation kind, mint a bearer token,
//! translate the payload, perform the HTTP call, classify the result, and
//! update delivery and mapping state. No database transaction is held
//! across the HTTP call; state is written before and after it.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use ostiary_db::models::{Delivery, Destination, ProvisioningEvent, ResourceMapping};
use ostiary_events::{ChangeKind, ResourceType};
use ostiary_scim_client::client::{ScimClient, ScimMethod, ScimRequest, ScimResponse};
use ostiary_scim_client::{mapper, TokenMinter};

use crate::error::ProvisioningResult;
use crate::operation::{parse_enabled_operations, DeleteAction, OperationKind};
use crate::retry::RetryPolicy;
use crate::scopes::required_scope;
use crate::store::DeliveryStore;

/// Synthetic HTTP status recorded when no network call was made.
const SYNTHETIC_OK: i32 = 200;

/// How one attempt proceeds after operation resolution.
enum AttemptPlan {
    /// Perform an HTTP request.
    Execute {
        method: ScimMethod,
        resource_id: Option<String>,
        body: Option<serde_json::Value>,
    },
    /// Mark success without network I/O.
    Skip(String),
    /// Mark permanent failure without network I/O.
    Fail(String),
}

/// Executes one delivery attempt end to end.
#[derive(Clone)]
pub struct DeliveryWorker {
    pool: PgPool,
    store: DeliveryStore,
    client: ScimClient,
    minter: TokenMinter,
}

impl DeliveryWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(pool: PgPool, client: ScimClient, minter: TokenMinter) -> Self {
        let store = DeliveryStore::new(pool.clone());
        Self {
            pool,
            store,
            client,
            minter,
        }
    }

    /// Process one claimed delivery.
    ///
    /// Infallible from the caller's perspective: an unexpected storage
    /// error is logged and the delivery stays in-progress for reclaim by a
    /// later poll tick.
    #[instrument(skip(self, delivery), fields(delivery_id = %delivery.id))]
    pub async fn process(&self, delivery: &Delivery) {
        if let Err(e) = self.try_process(delivery).await {
            error!(
                target: "scim_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Delivery attempt aborted; record left in progress for reclaim"
            );
        }
    }

    async fn try_process(&self, delivery: &Delivery) -> ProvisioningResult<()> {
        // Configuration may have changed between claim and attempt.
        let Some(destination) = Destination::find_by_id(&self.pool, delivery.destination_id).await?
        else {
            self.store
                .mark_failed(delivery.id, "Destination no longer exists", None)
                .await?;
            return Ok(());
        };
        if !destination.enabled {
            self.store
                .mark_failed(delivery.id, "Destination is disabled", None)
                .await?;
            return Ok(());
        }

        let Some(event) = ProvisioningEvent::find_by_id(&self.pool, delivery.event_id).await?
        else {
            self.store
                .mark_failed(delivery.id, "Event record missing", None)
                .await?;
            return Ok(());
        };

        let (Ok(resource_type), Ok(change_kind)) = (
            event.resource_type.parse::<ResourceType>(),
            event.change_kind.parse::<ChangeKind>(),
        ) else {
            self.store
                .mark_failed(
                    delivery.id,
                    &format!(
                        "Unrecognized event shape: {}/{}",
                        event.resource_type, event.change_kind
                    ),
                    None,
                )
                .await?;
            return Ok(());
        };

        let delete_action = destination
            .delete_action
            .parse::<DeleteAction>()
            .unwrap_or(DeleteAction::Deactivate);

        let Some(operation) = OperationKind::resolve(resource_type, change_kind, delete_action)
        else {
            // UPDATE on a membership has no SCIM counterpart.
            self.store
                .mark_success(delivery.id, SYNTHETIC_OK, None)
                .await?;
            return Ok(());
        };

        let enabled = parse_enabled_operations(&destination.enabled_operations);
        if !enabled.contains(&operation) {
            debug!(
                target: "scim_delivery",
                delivery_id = %delivery.id,
                operation = %operation,
                "Operation not enabled for destination; synthetic success"
            );
            self.store
                .mark_success(delivery.id, SYNTHETIC_OK, None)
                .await?;
            return Ok(());
        }

        match self.plan(&destination, &event, operation).await? {
            AttemptPlan::Skip(reason) => {
                debug!(
                    target: "scim_delivery",
                    delivery_id = %delivery.id,
                    operation = %operation,
                    reason = %reason,
                    "Skipping attempt; synthetic success"
                );
                self.store
                    .mark_success(delivery.id, SYNTHETIC_OK, None)
                    .await?;
                Ok(())
            }
            AttemptPlan::Fail(reason) => {
                self.store.mark_failed(delivery.id, &reason, None).await?;
                Ok(())
            }
            AttemptPlan::Execute {
                method,
                resource_id,
                body,
            } => {
                let response = match self
                    .execute(&destination, operation, method, resource_id.as_deref(), body)
                    .await
                {
                    Ok(response) => response,
                    Err(reason) => {
                        self.store.mark_failed(delivery.id, &reason, None).await?;
                        return Ok(());
                    }
                };
                self.finish(delivery, &destination, &event, operation, &response)
                    .await
            }
        }
    }

    /// Decide the HTTP request for an operation, resolving resource-id
    /// mappings. Missing-mapping rules: DELETE-semantics operations skip
    /// (nothing downstream to remove), UPDATEs and membership PATCHes fail
    /// permanently.
    async fn plan(
        &self,
        destination: &Destination,
        event: &ProvisioningEvent,
        operation: OperationKind,
    ) -> ProvisioningResult<AttemptPlan> {
        let plan = match operation {
            OperationKind::CreateUser => AttemptPlan::Execute {
                method: ScimMethod::Post,
                resource_id: None,
                body: Some(mapper::user_resource(
                    &event.snapshot,
                    &destination.attribute_mapping,
                    None,
                )),
            },
            OperationKind::UpdateUser => {
                match self.lookup(destination, ResourceType::User, &event.resource_id).await? {
                    Some(scim_id) => AttemptPlan::Execute {
                        method: ScimMethod::Put,
                        body: Some(mapper::user_resource(
                            &event.snapshot,
                            &destination.attribute_mapping,
                            Some(&scim_id),
                        )),
                        resource_id: Some(scim_id),
                    },
                    None => AttemptPlan::Fail(format!(
                        "No resource mapping for user {}; update cannot be translated",
                        event.resource_id
                    )),
                }
            }
            OperationKind::DeactivateUser => {
                match self.lookup(destination, ResourceType::User, &event.resource_id).await? {
                    Some(scim_id) => AttemptPlan::Execute {
                        method: ScimMethod::Patch,
                        resource_id: Some(scim_id),
                        body: Some(mapper::deactivate_patch()),
                    },
                    None => AttemptPlan::Skip("no mapping; nothing to deactivate".to_string()),
                }
            }
            OperationKind::DeleteUser => {
                match self.lookup(destination, ResourceType::User, &event.resource_id).await? {
                    Some(scim_id) => AttemptPlan::Execute {
                        method: ScimMethod::Delete,
                        resource_id: Some(scim_id),
                        body: None,
                    },
                    None => AttemptPlan::Skip("no mapping; nothing to delete".to_string()),
                }
            }
            OperationKind::CreateGroup => AttemptPlan::Execute {
                method: ScimMethod::Post,
                resource_id: None,
                body: Some(mapper::group_resource(&event.snapshot, None)),
            },
            OperationKind::UpdateGroup => {
                match self.lookup(destination, ResourceType::Group, &event.resource_id).await? {
                    Some(scim_id) => AttemptPlan::Execute {
                        method: ScimMethod::Put,
                        body: Some(mapper::group_resource(&event.snapshot, Some(&scim_id))),
                        resource_id: Some(scim_id),
                    },
                    None => AttemptPlan::Fail(format!(
                        "No resource mapping for group {}; update cannot be translated",
                        event.resource_id
                    )),
                }
            }
            OperationKind::DeleteGroup => {
                match self.lookup(destination, ResourceType::Group, &event.resource_id).await? {
                    Some(scim_id) => AttemptPlan::Execute {
                        method: ScimMethod::Delete,
                        resource_id: Some(scim_id),
                        body: None,
                    },
                    None => AttemptPlan::Skip("no mapping; nothing to delete".to_string()),
                }
            }
            OperationKind::AddGroupMember | OperationKind::RemoveGroupMember => {
                self.plan_membership(destination, event, operation).await?
            }
        };

        Ok(plan)
    }

    async fn plan_membership(
        &self,
        destination: &Destination,
        event: &ProvisioningEvent,
        operation: OperationKind,
    ) -> ProvisioningResult<AttemptPlan> {
        let member = &event.snapshot["groupMember"];
        let (Some(group_id), Some(user_id)) =
            (member["groupId"].as_str(), member["userId"].as_str())
        else {
            return Ok(AttemptPlan::Fail(
                "Malformed membership snapshot: groupId/userId missing".to_string(),
            ));
        };

        let Some(group_scim_id) = self.lookup(destination, ResourceType::Group, group_id).await?
        else {
            return Ok(AttemptPlan::Fail(format!(
                "No resource mapping for group {group_id}; membership change skipped"
            )));
        };
        let Some(user_scim_id) = self.lookup(destination, ResourceType::User, user_id).await?
        else {
            return Ok(AttemptPlan::Fail(format!(
                "No resource mapping for user {user_id}; membership change skipped"
            )));
        };

        let body = match operation {
            OperationKind::AddGroupMember => mapper::add_member_patch(&user_scim_id),
            _ => mapper::remove_member_patch(&user_scim_id),
        };

        Ok(AttemptPlan::Execute {
            method: ScimMethod::Patch,
            resource_id: Some(group_scim_id),
            body: Some(body),
        })
    }

    async fn lookup(
        &self,
        destination: &Destination,
        resource_type: ResourceType,
        local_id: &str,
    ) -> ProvisioningResult<Option<String>> {
        let mapping = ResourceMapping::find(
            &self.pool,
            destination.id,
            resource_type.as_str(),
            local_id,
        )
        .await?;
        Ok(mapping.map(|m| m.scim_resource_id))
    }

    /// Mint a fresh token and perform the HTTP call. Returns `Err` with a
    /// delivery error message when the token cannot be minted.
    async fn execute(
        &self,
        destination: &Destination,
        operation: OperationKind,
        method: ScimMethod,
        resource_id: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Result<ScimResponse, String> {
        let tenant = match ostiary_db::models::Tenant::find_by_id(&self.pool, destination.tenant_id)
            .await
        {
            Ok(Some(tenant)) => tenant,
            Ok(None) => return Err("Tenant record missing".to_string()),
            Err(e) => return Err(format!("Failed to load tenant: {e}")),
        };

        let token = self
            .minter
            .mint(
                destination.tenant_id,
                &tenant.issuer_url,
                destination.client_app_id,
                &destination.base_url,
                &[required_scope(operation)],
            )
            .await
            .map_err(|e| format!("Token minting failed: {e}"))?;

        Ok(self
            .client
            .execute(ScimRequest {
                base_url: &destination.base_url,
                token: &token,
                method,
                resource_path: operation.resource_path(),
                resource_id,
                body: body.as_ref(),
            })
            .await)
    }

    /// Classify the response and write the resulting delivery and mapping
    /// state.
    async fn finish(
        &self,
        delivery: &Delivery,
        destination: &Destination,
        event: &ProvisioningEvent,
        operation: OperationKind,
        response: &ScimResponse,
    ) -> ProvisioningResult<()> {
        // A DELETE answered with 404 means the resource is already gone
        // downstream; treat as success and drop the stale mapping.
        let gone_already = response.status == 404 && operation.is_hard_delete();

        if response.is_success() || gone_already {
            if operation.is_create() {
                return self.finish_create(delivery, destination, event, response).await;
            }

            self.store
                .mark_success(delivery.id, i32::from(response.status), None)
                .await?;

            if operation.removes_mapping() {
                ResourceMapping::delete(
                    &self.pool,
                    destination.id,
                    &event.resource_type,
                    &event.resource_id,
                )
                .await?;
            }
            return Ok(());
        }

        let http_status = (response.status > 0).then_some(i32::from(response.status));
        let error = response.failure_summary();

        if response.is_retryable() {
            let policy = RetryPolicy::from_value(&destination.retry_policy);
            if policy.is_exhausted(delivery.retry_count) {
                self.store
                    .mark_failed(
                        delivery.id,
                        &format!("Retries exhausted: {error}"),
                        http_status,
                    )
                    .await?;
            } else {
                let next_retry_at = Utc::now() + policy.backoff(delivery.retry_count);
                self.store
                    .mark_retrying(
                        delivery.id,
                        http_status,
                        &error,
                        next_retry_at,
                        delivery.retry_count + 1,
                    )
                    .await?;
            }
        } else {
            self.store
                .mark_failed(delivery.id, &error, http_status)
                .await?;
        }

        Ok(())
    }

    /// Successful CREATE: the downstream id must be present for the
    /// mapping to be recorded; without it, subsequent updates could never
    /// be translated.
    async fn finish_create(
        &self,
        delivery: &Delivery,
        destination: &Destination,
        event: &ProvisioningEvent,
        response: &ScimResponse,
    ) -> ProvisioningResult<()> {
        match response.scim_resource_id.as_deref() {
            Some(scim_id) => {
                self.store
                    .mark_success(delivery.id, i32::from(response.status), Some(scim_id))
                    .await?;
                ResourceMapping::upsert(
                    &self.pool,
                    destination.id,
                    &event.resource_type,
                    &event.resource_id,
                    scim_id,
                )
                .await?;
            }
            None => {
                self.store
                    .mark_failed(
                        delivery.id,
                        "CREATE succeeded but the response had no resource id",
                        Some(i32::from(response.status)),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
