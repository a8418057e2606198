//! Connection pool management for `PostgreSQL`.

use crate::error::DbError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// A wrapper around `SQLx`'s `PostgreSQL` connection pool.
///
/// # Example
///
/// ```rust,ignore
/// use ostiary_db::DbPool;
///
/// let pool = DbPool::connect("postgres://localhost/ostiary").await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: PgPool,
}

impl DbPool {
    /// Connect to `PostgreSQL` using the provided database URL.
    ///
    /// Uses default pool options (min: 1, max: 10, timeout: 5s).
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the connection cannot be
    /// established.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with_options(database_url, DbPoolOptions::default()).await
    }

    /// Connect to `PostgreSQL` with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        options: DbPoolOptions,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .min_connections(options.min_connections)
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        Ok(Self { inner: pool })
    }

    /// Wrap an existing `SQLx` `PgPool`.
    #[must_use]
    pub fn from_raw(pool: PgPool) -> Self {
        Self { inner: pool }
    }

    /// Get a reference to the inner `SQLx` pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.inner
    }

    /// Begin a new database transaction.
    ///
    /// # Errors
    ///
    /// Returns `DbError::QueryFailed` if the transaction cannot be started.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, DbError> {
        self.inner.begin().await.map_err(DbError::QueryFailed)
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Configuration options for the database connection pool.
#[derive(Debug, Clone)]
pub struct DbPoolOptions {
    /// Minimum number of connections to maintain in the pool.
    pub min_connections: u32,

    /// Maximum number of connections allowed in the pool.
    pub max_connections: u32,

    /// Maximum time to wait when acquiring a connection.
    pub acquire_timeout: Duration,
}

impl Default for DbPoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}
