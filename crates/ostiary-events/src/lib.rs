//! # ostiary-events
//!
//! In-process event bus for lifecycle events that are relevant to outbound
//! SCIM provisioning.
//!
//! Producers publish a [`LocalEvent`] after their primary write has
//! committed; the provisioning core subscribes and fans the event out into
//! per-destination deliveries. Publishing is fire-and-forget: a publisher
//! never observes downstream provisioning failures.
//!
//! ## Example
//!
//! ```rust
//! use ostiary_core::TenantId;
//! use ostiary_events::{ChangeKind, EventBus, LocalEvent, ResourceType};
//!
//! let bus = EventBus::new(256);
//! let mut rx = bus.subscribe();
//!
//! let event = LocalEvent::new(
//!     TenantId::new(),
//!     ResourceType::User,
//!     "u-123",
//!     ChangeKind::Create,
//!     serde_json::json!({"user": {"id": "u-123", "username": "alice"}}),
//! );
//! bus.publish(event);
//! ```

pub mod bus;
pub mod error;
pub mod event;

pub use bus::EventBus;
pub use error::EventError;
pub use event::{ChangeKind, LocalEvent, ResourceType};
