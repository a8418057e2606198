//! Signing key model.
//!
//! Stores RSA signing key pairs per tenant with lifecycle states
//! (active/retiring/revoked). At most one key per tenant may be in `active`
//! state at any time; the token minter signs with that key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A JWT signing key stored in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SigningKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kid: String,
    pub algorithm: String,
    #[serde(skip_serializing)]
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new signing key record.
#[derive(Debug, Clone)]
pub struct CreateSigningKey {
    pub tenant_id: Uuid,
    pub kid: String,
    pub algorithm: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
}

impl SigningKey {
    /// Insert a new signing key (defaults to 'active' state).
    pub async fn insert(pool: &PgPool, input: CreateSigningKey) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO signing_keys (tenant_id, kid, algorithm, private_key_pem, public_key_pem)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(input.tenant_id)
        .bind(&input.kid)
        .bind(&input.algorithm)
        .bind(&input.private_key_pem)
        .bind(&input.public_key_pem)
        .fetch_one(pool)
        .await
    }

    /// Find the active signing key for a tenant.
    pub async fn find_active_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM signing_keys
            WHERE tenant_id = $1 AND state = 'active'
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Transition a key's state (e.g. active -> retiring).
    pub async fn update_state(
        pool: &PgPool,
        tenant_id: Uuid,
        kid: &str,
        new_state: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE signing_keys
            SET state = $3
            WHERE kid = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(kid)
        .bind(tenant_id)
        .bind(new_state)
        .fetch_optional(pool)
        .await
    }
}
