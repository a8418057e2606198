//! Resource mapping model.
//!
//! Binds a (destination, local resource type, local id) triple to the opaque
//! id the downstream SCIM server assigned to that resource. Required before
//! any UPDATE/DELETE or membership PATCH can be emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Binding from a local resource to its downstream SCIM id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub id: Uuid,
    pub destination_id: Uuid,
    pub local_resource_type: String,
    pub local_resource_id: String,
    pub scim_resource_id: String,
    pub created_at: DateTime<Utc>,
}

impl ResourceMapping {
    /// Insert or update the mapping for a triple.
    ///
    /// The downstream server may re-issue an id for a re-created resource;
    /// the stored binding always reflects the latest one.
    pub async fn upsert(
        pool: &PgPool,
        destination_id: Uuid,
        local_resource_type: &str,
        local_resource_id: &str,
        scim_resource_id: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO resource_mappings
                (destination_id, local_resource_type, local_resource_id, scim_resource_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (destination_id, local_resource_type, local_resource_id)
            DO UPDATE SET scim_resource_id = EXCLUDED.scim_resource_id
            RETURNING *
            "#,
        )
        .bind(destination_id)
        .bind(local_resource_type)
        .bind(local_resource_id)
        .bind(scim_resource_id)
        .fetch_one(pool)
        .await
    }

    /// Look up the downstream id for a local resource.
    pub async fn find(
        pool: &PgPool,
        destination_id: Uuid,
        local_resource_type: &str,
        local_resource_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM resource_mappings
            WHERE destination_id = $1
              AND local_resource_type = $2
              AND local_resource_id = $3
            "#,
        )
        .bind(destination_id)
        .bind(local_resource_type)
        .bind(local_resource_id)
        .fetch_optional(pool)
        .await
    }

    /// Remove the mapping for a triple. Returns true if a row was deleted.
    pub async fn delete(
        pool: &PgPool,
        destination_id: Uuid,
        local_resource_type: &str,
        local_resource_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM resource_mappings
            WHERE destination_id = $1
              AND local_resource_type = $2
              AND local_resource_id = $3
            "#,
        )
        .bind(destination_id)
        .bind(local_resource_type)
        .bind(local_resource_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every mapping for a destination. Called when the destination
    /// is deleted. Returns the number of removed rows.
    pub async fn delete_by_destination(
        pool: &PgPool,
        destination_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM resource_mappings WHERE destination_id = $1
            "#,
        )
        .bind(destination_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
