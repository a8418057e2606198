//! Bearer token minting for delivery attempts.
//!
//! Every delivery attempt gets a freshly minted short-lived token scoped to
//! the operation being performed; tokens are never cached across retries.
//! Signing is delegated to a [`TokenSigner`], keeping the issuer's key
//! store behind a seam. The shipped implementation signs with the tenant's
//! active RS256 key from the database, with the `kid` header populated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ScimClientError, ScimClientResult};
use ostiary_db::models::SigningKey;

/// Default token lifetime.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Claims carried by a provisioning bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningClaims {
    /// Tenant issuer URL.
    pub iss: String,
    /// Client application id of the destination.
    pub sub: String,
    /// Destination base URL.
    pub aud: String,
    /// Same as `sub`.
    pub client_id: String,
    /// Space-separated required scopes.
    pub scope: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

impl ProvisioningClaims {
    /// Build claims for one delivery attempt.
    #[must_use]
    pub fn new(
        issuer: &str,
        client_app_id: Uuid,
        audience: &str,
        scopes: &[&str],
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: issuer.to_string(),
            sub: client_app_id.to_string(),
            aud: audience.to_string(),
            client_id: client_app_id.to_string(),
            scope: scopes.join(" "),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Signs provisioning claims with a tenant's current signing key.
#[async_trait]
pub trait TokenSigner: Send + Sync {
    /// Produce a signed compact JWT for the given claims.
    async fn sign(&self, tenant_id: Uuid, claims: &ProvisioningClaims)
        -> ScimClientResult<String>;
}

/// [`TokenSigner`] backed by the per-tenant signing key store.
///
/// Signs with the tenant's single `active` RS256 key and sets the `kid`
/// header so downstream verifiers can select the matching JWKS entry.
pub struct DbTokenSigner {
    pool: PgPool,
}

impl DbTokenSigner {
    /// Create a signer over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenSigner for DbTokenSigner {
    async fn sign(
        &self,
        tenant_id: Uuid,
        claims: &ProvisioningClaims,
    ) -> ScimClientResult<String> {
        let key = SigningKey::find_active_by_tenant(&self.pool, tenant_id)
            .await?
            .ok_or(ScimClientError::MissingSigningKey { tenant_id })?;

        if key.algorithm != "RS256" {
            return Err(ScimClientError::TokenSigning(format!(
                "Unsupported signing algorithm: {}",
                key.algorithm
            )));
        }

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key_pem.as_bytes())
            .map_err(|e| ScimClientError::TokenSigning(format!("Invalid private key: {e}")))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());

        jsonwebtoken::encode(&header, claims, &encoding_key)
            .map_err(|e| ScimClientError::TokenSigning(format!("Encoding failed: {e}")))
    }
}

/// Builds and signs one bearer token per delivery attempt.
#[derive(Clone)]
pub struct TokenMinter {
    signer: Arc<dyn TokenSigner>,
    token_lifetime: Duration,
}

impl TokenMinter {
    /// Create a minter over the given signer with the default lifetime.
    #[must_use]
    pub fn new(signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            signer,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    /// Override the token lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Mint a fresh token for one attempt against a destination.
    pub async fn mint(
        &self,
        tenant_id: Uuid,
        issuer: &str,
        client_app_id: Uuid,
        audience: &str,
        scopes: &[&str],
    ) -> ScimClientResult<String> {
        let claims = ProvisioningClaims::new(
            issuer,
            client_app_id,
            audience,
            scopes,
            self.token_lifetime,
        );
        self.signer.sign(tenant_id, &claims).await
    }
}
