//! Delivery state store.
//!
//! The operation surface the core uses to mutate delivery records. All
//! writes go through here so the state machine stays in one place:
//! `pending → in_progress → {success | retrying | failed}`, with
//! `retrying → in_progress` on the next claim and `in_progress → pending`
//! on stale reclaim.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ostiary_db::models::Delivery;

/// Service facade over the delivery table.
#[derive(Clone)]
pub struct DeliveryStore {
    pool: PgPool,
}

impl DeliveryStore {
    /// Create a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for collaborators that need direct reads.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert one pending delivery for an (event, destination) pair.
    ///
    /// Idempotent by pair; returns `None` when the pair already exists.
    #[instrument(skip(self))]
    pub async fn insert_pending(
        &self,
        event_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<Delivery>, sqlx::Error> {
        let inserted = Delivery::insert_pending(&self.pool, event_id, destination_id).await?;

        match &inserted {
            Some(delivery) => debug!(
                target: "scim_delivery",
                delivery_id = %delivery.id,
                event_id = %event_id,
                destination_id = %destination_id,
                "Delivery enqueued"
            ),
            None => debug!(
                target: "scim_delivery",
                event_id = %event_id,
                destination_id = %destination_id,
                "Delivery already exists for pair, skipping"
            ),
        }

        Ok(inserted)
    }

    /// Claim up to `limit` due deliveries, flipping them to in-progress.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Delivery>, sqlx::Error> {
        let claimed = Delivery::claim_due(&self.pool, now, limit).await?;
        if !claimed.is_empty() {
            debug!(
                target: "scim_delivery",
                count = claimed.len(),
                "Claimed due deliveries"
            );
        }
        Ok(claimed)
    }

    /// Record a successful attempt. Terminal.
    #[instrument(skip(self), fields(delivery_id = %id))]
    pub async fn mark_success(
        &self,
        id: Uuid,
        http_status: i32,
        scim_resource_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        Delivery::mark_success(&self.pool, id, http_status, scim_resource_id).await?;
        info!(
            target: "scim_delivery",
            delivery_id = %id,
            http_status,
            scim_resource_id = ?scim_resource_id,
            "Delivery succeeded"
        );
        Ok(())
    }

    /// Record a retryable failure and schedule the next attempt.
    #[instrument(skip(self, error), fields(delivery_id = %id))]
    pub async fn mark_retrying(
        &self,
        id: Uuid,
        http_status: Option<i32>,
        error: &str,
        next_retry_at: DateTime<Utc>,
        retry_count: i32,
    ) -> Result<(), sqlx::Error> {
        Delivery::mark_retrying(&self.pool, id, http_status, error, next_retry_at, retry_count)
            .await?;
        info!(
            target: "scim_delivery",
            delivery_id = %id,
            http_status = ?http_status,
            retry_count,
            next_retry_at = %next_retry_at,
            error,
            "Delivery scheduled for retry"
        );
        Ok(())
    }

    /// Record a permanent failure. Terminal.
    #[instrument(skip(self, error), fields(delivery_id = %id))]
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        http_status: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        Delivery::mark_failed(&self.pool, id, error, http_status).await?;
        warn!(
            target: "scim_delivery",
            delivery_id = %id,
            http_status = ?http_status,
            error,
            "Delivery failed permanently"
        );
        Ok(())
    }

    /// Release claims older than `claimed_before` back to pending.
    pub async fn release_stale(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let released = Delivery::release_stale(&self.pool, claimed_before).await?;
        if released > 0 {
            warn!(
                target: "scim_delivery",
                count = released,
                "Released stale in-progress deliveries"
            );
        }
        Ok(released)
    }

    /// List deliveries for a destination, newest first.
    pub async fn list_by_destination(
        &self,
        destination_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, sqlx::Error> {
        Delivery::list_by_destination(&self.pool, destination_id, limit, offset).await
    }

    /// List all deliveries produced by one event.
    pub async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Delivery>, sqlx::Error> {
        Delivery::list_by_event(&self.pool, event_id).await
    }
}
