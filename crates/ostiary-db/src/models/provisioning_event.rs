//! Durable copy of observed lifecycle events.
//!
//! The delivery worker runs long after the originating operation returned,
//! so the event snapshot must be loadable by id. Insertion is idempotent on
//! the event id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A recorded lifecycle event, including its entity snapshot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub resource_type: String,
    pub resource_id: String,
    pub change_kind: String,
    pub snapshot: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl ProvisioningEvent {
    /// Record an event, idempotently by id. Returns `None` when the event
    /// was already recorded.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        pool: &PgPool,
        id: Uuid,
        tenant_id: Uuid,
        resource_type: &str,
        resource_id: &str,
        change_kind: &str,
        snapshot: &serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO provisioning_events
                (id, tenant_id, resource_type, resource_id, change_kind, snapshot, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(resource_type)
        .bind(resource_id)
        .bind(change_kind)
        .bind(snapshot)
        .bind(occurred_at)
        .fetch_optional(pool)
        .await
    }

    /// Load an event by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM provisioning_events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
