//! Event intake and fan-out.
//!
//! Observes lifecycle events, records them durably, and materializes one
//! pending delivery per enabled destination of the event's tenant. The
//! primary local operation has already committed by the time an event
//! arrives, so failures here are logged and never propagated.

use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use ostiary_db::models::{Destination, ProvisioningEvent};
use ostiary_events::LocalEvent;

use crate::error::ProvisioningResult;
use crate::store::DeliveryStore;

/// Fans lifecycle events out into per-destination deliveries.
#[derive(Clone)]
pub struct EventIntake {
    pool: PgPool,
    store: DeliveryStore,
}

impl EventIntake {
    /// Create an intake over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let store = DeliveryStore::new(pool.clone());
        Self { pool, store }
    }

    /// Handle one observed lifecycle event.
    ///
    /// Never returns an error: persistence failures are logged and the
    /// event is dropped (the poller cannot see deliveries that were never
    /// inserted, so there is nothing to retry here).
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn on_event(&self, event: &LocalEvent) {
        match self.fan_out(event).await {
            Ok(count) => {
                info!(
                    target: "scim_delivery",
                    event_id = %event.event_id,
                    tenant_id = %event.tenant_id,
                    resource_type = %event.resource_type,
                    kind = %event.kind,
                    deliveries = count,
                    "Fanned out lifecycle event"
                );
            }
            Err(e) => {
                error!(
                    target: "scim_delivery",
                    event_id = %event.event_id,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Fan-out failed; event dropped"
                );
            }
        }
    }

    /// Record the event and insert one pending delivery per enabled
    /// destination. Returns the number of deliveries created.
    async fn fan_out(&self, event: &LocalEvent) -> ProvisioningResult<u32> {
        ProvisioningEvent::record(
            &self.pool,
            event.event_id.into_uuid(),
            event.tenant_id.into_uuid(),
            event.resource_type.as_str(),
            &event.resource_id,
            event.kind.as_str(),
            &event.snapshot,
            event.occurred_at,
        )
        .await?;

        let destinations =
            Destination::find_enabled_by_tenant(&self.pool, event.tenant_id.into_uuid()).await?;

        if destinations.is_empty() {
            debug!(
                target: "scim_delivery",
                event_id = %event.event_id,
                tenant_id = %event.tenant_id,
                "No enabled destinations for tenant"
            );
            return Ok(0);
        }

        let mut created = 0;
        for destination in &destinations {
            if self
                .store
                .insert_pending(event.event_id.into_uuid(), destination.id)
                .await?
                .is_some()
            {
                created += 1;
            }
        }

        Ok(created)
    }
}
