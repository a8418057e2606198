//! Client application model.
//!
//! The minimal application record a destination is bound to. Secrets are
//! stored as SHA-256 hashes, never in plaintext; the raw secret is shown to
//! the operator exactly once at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A client application bound to one tenant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClientApplication {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// SHA-256 hash of the client secret. Never exposed in API responses.
    #[serde(skip_serializing)]
    pub secret_hash: String,
    /// JSON array of granted scope names.
    pub scopes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new client application.
#[derive(Debug, Clone)]
pub struct CreateClientApplication {
    pub tenant_id: Uuid,
    pub name: String,
    pub secret_hash: String,
    pub scopes: serde_json::Value,
}

impl ClientApplication {
    /// Create a new client application record.
    pub async fn create(
        pool: &PgPool,
        data: &CreateClientApplication,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO client_applications (tenant_id, name, secret_hash, scopes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&data.secret_hash)
        .bind(&data.scopes)
        .fetch_one(pool)
        .await
    }

    /// Find an application by ID within a tenant.
    pub async fn get_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM client_applications
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// The application's scope names as strings.
    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
