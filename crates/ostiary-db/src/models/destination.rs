//! Destination model.
//!
//! A destination is a configured downstream SCIM service provider bound to
//! one tenant. JSONB columns (`attribute_mapping`, `enabled_operations`,
//! `retry_policy`) are stored as raw values here; the provisioning crate
//! owns their typed interpretation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A downstream SCIM service provider configuration record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Destination {
    /// Unique destination identifier.
    pub id: Uuid,

    /// Tenant this destination belongs to.
    pub tenant_id: Uuid,

    /// Client application that holds the scopes required by the enabled
    /// operations.
    pub client_app_id: Uuid,

    /// Human-readable name, unique within the tenant.
    pub name: String,

    /// Base URL of the SCIM service provider. Trailing-slash-insensitive.
    pub base_url: String,

    /// Mapping from SCIM attribute path to source expression. Empty object
    /// means the default mapping applies.
    pub attribute_mapping: serde_json::Value,

    /// JSON array of enabled operation kind names.
    pub enabled_operations: serde_json::Value,

    /// Deprovisioning semantics: `deactivate` or `hard_delete`.
    pub delete_action: String,

    /// Retry policy parameters as JSON.
    pub retry_policy: serde_json::Value,

    /// Whether events fan out to this destination.
    pub enabled: bool,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new destination.
#[derive(Debug, Clone)]
pub struct CreateDestination {
    pub tenant_id: Uuid,
    pub client_app_id: Uuid,
    pub name: String,
    pub base_url: String,
    pub attribute_mapping: serde_json::Value,
    pub enabled_operations: serde_json::Value,
    pub delete_action: String,
    pub retry_policy: serde_json::Value,
    pub enabled: bool,
}

/// Data for updating an existing destination (partial update).
#[derive(Debug, Clone, Default)]
pub struct UpdateDestination {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub attribute_mapping: Option<serde_json::Value>,
    pub enabled_operations: Option<serde_json::Value>,
    pub delete_action: Option<String>,
    pub retry_policy: Option<serde_json::Value>,
    pub enabled: Option<bool>,
}

impl Destination {
    /// Create a new destination record.
    pub async fn create(pool: &PgPool, data: &CreateDestination) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO destinations
                (tenant_id, client_app_id, name, base_url, attribute_mapping,
                 enabled_operations, delete_action, retry_policy, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(data.client_app_id)
        .bind(&data.name)
        .bind(&data.base_url)
        .bind(&data.attribute_mapping)
        .bind(&data.enabled_operations)
        .bind(&data.delete_action)
        .bind(&data.retry_policy)
        .bind(data.enabled)
        .fetch_one(pool)
        .await
    }

    /// Find a destination by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM destinations WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a destination by ID within a specific tenant.
    pub async fn get_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM destinations
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// List destinations for a tenant with pagination.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM destinations
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Find all enabled destinations for a tenant. This is the fan-out set.
    pub async fn find_enabled_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM destinations
            WHERE tenant_id = $1 AND enabled = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Update a destination with partial update semantics.
    ///
    /// Only non-None fields are changed; other fields retain their current
    /// values.
    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: &UpdateDestination,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE destinations
            SET name = COALESCE($3, name),
                base_url = COALESCE($4, base_url),
                attribute_mapping = COALESCE($5, attribute_mapping),
                enabled_operations = COALESCE($6, enabled_operations),
                delete_action = COALESCE($7, delete_action),
                retry_policy = COALESCE($8, retry_policy),
                enabled = COALESCE($9, enabled),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&data.name)
        .bind(&data.base_url)
        .bind(&data.attribute_mapping)
        .bind(&data.enabled_operations)
        .bind(&data.delete_action)
        .bind(&data.retry_policy)
        .bind(data.enabled)
        .fetch_optional(pool)
        .await
    }

    /// Delete a destination. Returns true if a row was deleted.
    ///
    /// Historical deliveries are retained; the caller is responsible for
    /// removing resource mappings first.
    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM destinations
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
