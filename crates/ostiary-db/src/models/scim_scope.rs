//! Named scope registry.
//!
//! Tracks which named SCIM scopes exist per tenant. `ensure` is idempotent
//! via ON CONFLICT, so scope provisioning can be retried safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A named scope registered for a tenant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScimScope {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ScimScope {
    /// Ensure a named scope exists for a tenant.
    ///
    /// Returns true if the scope was created, false if it already existed.
    pub async fn ensure(pool: &PgPool, tenant_id: Uuid, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO scim_scopes (tenant_id, name)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, name) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List scope names registered for a tenant.
    pub async fn list_names(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM scim_scopes
            WHERE tenant_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
