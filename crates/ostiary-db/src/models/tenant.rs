//! Tenant model.
//!
//! The isolation boundary for destinations, scopes, and client
//! applications. The token minter reads `issuer_url` for the `iss` claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// An authorization-server tenant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub issuer_url: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant record.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        issuer_url: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO tenants (name, issuer_url)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(issuer_url)
        .fetch_one(pool)
        .await
    }

    /// Find a tenant by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM tenants WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
