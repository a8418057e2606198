//! Delivery model.
//!
//! One row per (event, destination) pair: the durable record of the attempt
//! sequence for propagating a single local event to a single destination.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so that concurrent pollers never
//! hand the same delivery to two workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Maximum persisted length of `last_error`.
pub const MAX_ERROR_LEN: usize = 1000;

/// Delivery lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    Success,
    Retrying,
    Failed,
}

impl DeliveryStatus {
    /// Stable string representation, matching the persisted values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InProgress => "in_progress",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_progress" => Ok(DeliveryStatus::InProgress),
            "success" => Ok(DeliveryStatus::Success),
            "retrying" => Ok(DeliveryStatus::Retrying),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(format!("Unknown delivery status: {s}")),
        }
    }
}

/// The durable record of propagating one local event to one destination.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub event_id: Uuid,
    pub destination_id: Uuid,
    pub status: String,
    pub scim_resource_id: Option<String>,
    pub http_status: Option<i32>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Parse the persisted status string. Unknown values map to `Pending`.
    #[must_use]
    pub fn status_kind(&self) -> DeliveryStatus {
        self.status.parse().unwrap_or(DeliveryStatus::Pending)
    }

    /// Whether the delivery has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status_kind().is_terminal()
    }

    /// Insert a pending delivery for an (event, destination) pair.
    ///
    /// Idempotent by pair: a duplicate insert is a no-op and returns `None`.
    pub async fn insert_pending(
        pool: &PgPool,
        event_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO deliveries (event_id, destination_id, status)
            VALUES ($1, $2, 'pending')
            ON CONFLICT (event_id, destination_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(destination_id)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim deliveries that are due for processing.
    ///
    /// Due means `pending`, or `retrying` with `next_retry_at <= now`.
    /// Claimed rows flip to `in_progress` and are returned in `created_at`
    /// order, which preserves per-resource event ordering.
    pub async fn claim_due(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE deliveries
            SET status = 'in_progress',
                claimed_at = $1
            WHERE id IN (
                SELECT id FROM deliveries
                WHERE status = 'pending'
                   OR (status = 'retrying' AND next_retry_at <= $1)
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Mark a delivery as succeeded.
    pub async fn mark_success(
        pool: &PgPool,
        id: Uuid,
        http_status: i32,
        scim_resource_id: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE deliveries
            SET status = 'success',
                http_status = $2,
                scim_resource_id = COALESCE($3, scim_resource_id),
                next_retry_at = NULL,
                last_error = NULL,
                completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(http_status)
        .bind(scim_resource_id)
        .fetch_optional(pool)
        .await
    }

    /// Mark a delivery for retry with a scheduled next attempt.
    pub async fn mark_retrying(
        pool: &PgPool,
        id: Uuid,
        http_status: Option<i32>,
        error: &str,
        next_retry_at: DateTime<Utc>,
        retry_count: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE deliveries
            SET status = 'retrying',
                http_status = $2,
                last_error = $3,
                next_retry_at = $4,
                retry_count = $5,
                claimed_at = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(http_status)
        .bind(truncate_error(error))
        .bind(next_retry_at)
        .bind(retry_count)
        .fetch_optional(pool)
        .await
    }

    /// Mark a delivery as permanently failed.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        http_status: Option<i32>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE deliveries
            SET status = 'failed',
                http_status = COALESCE($3, http_status),
                last_error = $2,
                next_retry_at = NULL,
                completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(truncate_error(error))
        .bind(http_status)
        .fetch_optional(pool)
        .await
    }

    /// Release stale in-progress deliveries back to pending.
    ///
    /// Handles workers that crashed while holding a claim. Returns the
    /// number of released rows.
    pub async fn release_stale(
        pool: &PgPool,
        claimed_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'pending',
                claimed_at = NULL
            WHERE status = 'in_progress'
              AND claimed_at < $1
            "#,
        )
        .bind(claimed_before)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List deliveries for a destination, newest first, with pagination.
    pub async fn list_by_destination(
        pool: &PgPool,
        destination_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM deliveries
            WHERE destination_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(destination_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// List all deliveries produced by one event.
    pub async fn list_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM deliveries
            WHERE event_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Count deliveries for a destination.
    pub async fn count_by_destination(
        pool: &PgPool,
        destination_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM deliveries WHERE destination_id = $1
            "#,
        )
        .bind(destination_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}

/// Truncate an error message to the persisted column limit.
#[must_use]
pub fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LEN).collect()
}
