//! Lifecycle event contract consumed by the provisioning core.

use chrono::{DateTime, Utc};
use ostiary_core::{EventId, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// The kind of local resource an event refers to.
///
/// Only these three resource types are SCIM-relevant; events for anything
/// else are never published on this bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    User,
    Group,
    GroupMember,
}

impl ResourceType {
    /// Stable string representation, matching the persisted enum values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "USER",
            ResourceType::Group => "GROUP",
            ResourceType::GroupMember => "GROUP_MEMBER",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(ResourceType::User),
            "GROUP" => Ok(ResourceType::Group),
            "GROUP_MEMBER" => Ok(ResourceType::GroupMember),
            _ => Err(EventError::UnknownResourceType {
                value: s.to_string(),
            }),
        }
    }
}

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    /// Stable string representation, matching the persisted enum values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "CREATE",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(ChangeKind::Create),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            _ => Err(EventError::UnknownChangeKind {
                value: s.to_string(),
            }),
        }
    }
}

/// A lifecycle event recorded for a local user, group, or membership.
///
/// The `snapshot` is a structural dump of the entity at event time, e.g.
/// `{"user": {...}, "profile": {...}}` for users or
/// `{"groupMember": {"groupId": ..., "userId": ...}}` for memberships.
/// Producers must publish only after the primary write has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEvent {
    /// Unique identifier for this event instance. Used for idempotent
    /// fan-out: re-publishing the same event id is a no-op.
    pub event_id: EventId,

    /// Tenant context for multi-tenant isolation.
    pub tenant_id: TenantId,

    /// Which kind of resource changed.
    pub resource_type: ResourceType,

    /// Local identifier of the resource. For memberships this is the
    /// composite `"<group_id>:<user_id>"` form.
    pub resource_id: String,

    /// What happened.
    pub kind: ChangeKind,

    /// When the change occurred.
    pub occurred_at: DateTime<Utc>,

    /// Structural dump of the entity at event time.
    pub snapshot: serde_json::Value,
}

impl LocalEvent {
    /// Create a new event with a fresh id, stamped now.
    pub fn new(
        tenant_id: TenantId,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        kind: ChangeKind,
        snapshot: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            tenant_id,
            resource_type,
            resource_id: resource_id.into(),
            kind,
            occurred_at: Utc::now(),
            snapshot,
        }
    }

    /// Create an event with a specific id. Useful for tests and replays.
    pub fn with_id(
        event_id: EventId,
        tenant_id: TenantId,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        kind: ChangeKind,
        snapshot: serde_json::Value,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            resource_type,
            resource_id: resource_id.into(),
            kind,
            occurred_at: Utc::now(),
            snapshot,
        }
    }

    /// Serialize the event to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationFailed {
            cause: e.to_string(),
        })
    }

    /// Deserialize an event from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationFailed {
            cause: e.to_string(),
        })
    }
}
