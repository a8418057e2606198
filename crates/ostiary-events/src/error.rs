//! Error types for the event bus.

use thiserror::Error;

/// Event bus and event contract errors.
#[derive(Debug, Error)]
pub enum EventError {
    /// Unknown resource type string.
    #[error("Unknown resource type: {value}")]
    UnknownResourceType { value: String },

    /// Unknown change kind string.
    #[error("Unknown change kind: {value}")]
    UnknownChangeKind { value: String },

    /// Event failed to serialize.
    #[error("Event serialization failed: {cause}")]
    SerializationFailed { cause: String },

    /// Event failed to deserialize.
    #[error("Event deserialization failed: {cause}")]
    DeserializationFailed { cause: String },
}
