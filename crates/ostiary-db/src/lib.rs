//! # ostiary-db
//!
//! PostgreSQL persistence for the ostiary provisioning core.
//!
//! Provides the connection pool wrapper, embedded migrations, and one model
//! module per table. Models are thin `FromRow` structs with associated query
//! functions; typed interpretation of JSONB columns (operation sets, retry
//! policies, attribute mappings) happens in the provisioning crate.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolOptions};
