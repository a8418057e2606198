//! # Outbound SCIM Provisioning Engine
//!
//! Fan-out and delivery infrastructure that propagates local lifecycle
//! events to downstream SCIM 2.0 service providers.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────────┐
//! │  Event Bus   │────►│ Event Intake  │────►│  Delivery Store  │
//! │ (in-process) │     │   (fan-out)   │     │   (PostgreSQL)   │
//! └──────────────┘     └───────────────┘     └────────┬─────────┘
//!                                                     │ claim
//!                                            ┌────────▼─────────┐
//!                                            │    Scheduler     │
//!                                            │ (poll interval)  │
//!                                            └────────┬─────────┘
//!                                                     │ dispatch
//!                       ┌─────────────┐      ┌────────▼─────────┐
//!                       │ Token Minter│◄─────│ Delivery Worker  │
//!                       └─────────────┘      │  (per attempt)   │
//!                       ┌─────────────┐      └────────┬─────────┘
//!                       │  Translator │◄─────────────┤
//!                       └─────────────┘               │ HTTP
//!                                            ┌────────▼─────────┐
//!                                            │ downstream SCIM  │
//!                                            │ service provider │
//!                                            └──────────────────┘
//! ```
//!
//! One local event becomes one durable [`Delivery`] per enabled destination
//! of its tenant. Each delivery carries its own retry state; a retryable
//! failure on one destination never affects its siblings. Deliveries are
//! claimed with `FOR UPDATE SKIP LOCKED` so at most one worker owns a given
//! record at a time, and stale claims from crashed workers are reclaimed by
//! the poller.
//!
//! [`Delivery`]: ostiary_db::models::Delivery

pub mod config;
pub mod error;
pub mod fanout;
pub mod operation;
pub mod processor;
pub mod retry;
pub mod scopes;
pub mod service;
pub mod store;
pub mod worker;

pub use config::{ConfigError, ProcessorKind, ScimConfig};
pub use error::{ProvisioningError, ProvisioningResult};
pub use fanout::EventIntake;
pub use operation::{DeleteAction, OperationKind};
pub use processor::{build_processor, EventProcessor, ScheduledProcessor};
pub use retry::RetryPolicy;
pub use scopes::{
    required_scope, required_scopes, ScopePolicy, SCOPE_GROUPS_READ, SCOPE_GROUPS_WRITE,
    SCOPE_USERS_READ, SCOPE_USERS_WRITE,
};
pub use service::{
    DestinationCreateRequest, DestinationCreated, DestinationService, DestinationUpdateRequest,
};
pub use store::DeliveryStore;
pub use worker::DeliveryWorker;
