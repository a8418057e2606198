//! SCIM operation kinds and their resolution from local events.

use ostiary_events::{ChangeKind, ResourceType};
use serde::{Deserialize, Serialize};

/// What a destination does when a local user is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteAction {
    /// PATCH the downstream user to `active = false`.
    Deactivate,
    /// DELETE the downstream user resource.
    HardDelete,
}

impl DeleteAction {
    /// Stable string representation, matching the persisted values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteAction::Deactivate => "deactivate",
            DeleteAction::HardDelete => "hard_delete",
        }
    }
}

impl std::fmt::Display for DeleteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeleteAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deactivate" => Ok(DeleteAction::Deactivate),
            "hard_delete" => Ok(DeleteAction::HardDelete),
            _ => Err(format!("Unknown delete action: {s}")),
        }
    }
}

/// The nine SCIM operations the core may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreateUser,
    UpdateUser,
    DeactivateUser,
    DeleteUser,
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
    AddGroupMember,
    RemoveGroupMember,
}

impl OperationKind {
    /// All nine operation kinds.
    pub const ALL: [OperationKind; 9] = [
        OperationKind::CreateUser,
        OperationKind::UpdateUser,
        OperationKind::DeactivateUser,
        OperationKind::DeleteUser,
        OperationKind::CreateGroup,
        OperationKind::UpdateGroup,
        OperationKind::DeleteGroup,
        OperationKind::AddGroupMember,
        OperationKind::RemoveGroupMember,
    ];

    /// Stable string representation, matching the persisted values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateUser => "CREATE_USER",
            OperationKind::UpdateUser => "UPDATE_USER",
            OperationKind::DeactivateUser => "DEACTIVATE_USER",
            OperationKind::DeleteUser => "DELETE_USER",
            OperationKind::CreateGroup => "CREATE_GROUP",
            OperationKind::UpdateGroup => "UPDATE_GROUP",
            OperationKind::DeleteGroup => "DELETE_GROUP",
            OperationKind::AddGroupMember => "ADD_GROUP_MEMBER",
            OperationKind::RemoveGroupMember => "REMOVE_GROUP_MEMBER",
        }
    }

    /// Resolve the operation kind for an event against a destination.
    ///
    /// Returns `None` for event shapes that are benign no-ops (an UPDATE on
    /// a membership).
    #[must_use]
    pub fn resolve(
        resource_type: ResourceType,
        kind: ChangeKind,
        delete_action: DeleteAction,
    ) -> Option<OperationKind> {
        match (resource_type, kind) {
            (ResourceType::User, ChangeKind::Create) => Some(OperationKind::CreateUser),
            (ResourceType::User, ChangeKind::Update) => Some(OperationKind::UpdateUser),
            (ResourceType::User, ChangeKind::Delete) => Some(match delete_action {
                DeleteAction::Deactivate => OperationKind::DeactivateUser,
                DeleteAction::HardDelete => OperationKind::DeleteUser,
            }),
            (ResourceType::Group, ChangeKind::Create) => Some(OperationKind::CreateGroup),
            (ResourceType::Group, ChangeKind::Update) => Some(OperationKind::UpdateGroup),
            (ResourceType::Group, ChangeKind::Delete) => Some(OperationKind::DeleteGroup),
            (ResourceType::GroupMember, ChangeKind::Create) => {
                Some(OperationKind::AddGroupMember)
            }
            (ResourceType::GroupMember, ChangeKind::Delete) => {
                Some(OperationKind::RemoveGroupMember)
            }
            (ResourceType::GroupMember, ChangeKind::Update) => None,
        }
    }

    /// Whether this is a CREATE that establishes a resource mapping.
    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, OperationKind::CreateUser | OperationKind::CreateGroup)
    }

    /// Whether a successful attempt removes the resource mapping.
    #[must_use]
    pub fn removes_mapping(&self) -> bool {
        matches!(
            self,
            OperationKind::DeactivateUser | OperationKind::DeleteUser | OperationKind::DeleteGroup
        )
    }

    /// Whether this operation DELETEs the downstream resource. A 404 from
    /// the destination is treated as success for these (the resource is
    /// already gone) and the stale mapping is removed.
    #[must_use]
    pub fn is_hard_delete(&self) -> bool {
        matches!(self, OperationKind::DeleteUser | OperationKind::DeleteGroup)
    }

    /// SCIM resource collection this operation targets.
    #[must_use]
    pub fn resource_path(&self) -> &'static str {
        match self {
            OperationKind::CreateUser
            | OperationKind::UpdateUser
            | OperationKind::DeactivateUser
            | OperationKind::DeleteUser => "Users",
            OperationKind::CreateGroup
            | OperationKind::UpdateGroup
            | OperationKind::DeleteGroup
            | OperationKind::AddGroupMember
            | OperationKind::RemoveGroupMember => "Groups",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown operation kind: {s}"))
    }
}

/// Parse a destination's `enabled_operations` JSONB column.
///
/// Unknown entries are skipped rather than failing the whole set, so a
/// destination configured by a newer release still deserializes.
#[must_use]
pub fn parse_enabled_operations(value: &serde_json::Value) -> Vec<OperationKind> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Serialize an operation set for the `enabled_operations` JSONB column.
#[must_use]
pub fn operations_to_value(operations: &[OperationKind]) -> serde_json::Value {
    serde_json::Value::Array(
        operations
            .iter()
            .map(|op| serde_json::Value::String(op.as_str().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_roundtrip() {
        for op in OperationKind::ALL {
            let parsed: OperationKind = op.as_str().parse().unwrap();
            assert_eq!(op, parsed);
        }
    }

    #[test]
    fn test_resolve_user_delete_respects_delete_action() {
        assert_eq!(
            OperationKind::resolve(
                ResourceType::User,
                ChangeKind::Delete,
                DeleteAction::Deactivate
            ),
            Some(OperationKind::DeactivateUser)
        );
        assert_eq!(
            OperationKind::resolve(
                ResourceType::User,
                ChangeKind::Delete,
                DeleteAction::HardDelete
            ),
            Some(OperationKind::DeleteUser)
        );
    }

    #[test]
    fn test_resolve_group_operations() {
        assert_eq!(
            OperationKind::resolve(
                ResourceType::Group,
                ChangeKind::Create,
                DeleteAction::Deactivate
            ),
            Some(OperationKind::CreateGroup)
        );
        assert_eq!(
            OperationKind::resolve(
                ResourceType::Group,
                ChangeKind::Delete,
                DeleteAction::Deactivate
            ),
            Some(OperationKind::DeleteGroup)
        );
    }

    #[test]
    fn test_membership_update_is_noop() {
        assert_eq!(
            OperationKind::resolve(
                ResourceType::GroupMember,
                ChangeKind::Update,
                DeleteAction::Deactivate
            ),
            None
        );
    }

    #[test]
    fn test_membership_create_and_delete() {
        assert_eq!(
            OperationKind::resolve(
                ResourceType::GroupMember,
                ChangeKind::Create,
                DeleteAction::HardDelete
            ),
            Some(OperationKind::AddGroupMember)
        );
        assert_eq!(
            OperationKind::resolve(
                ResourceType::GroupMember,
                ChangeKind::Delete,
                DeleteAction::HardDelete
            ),
            Some(OperationKind::RemoveGroupMember)
        );
    }

    #[test]
    fn test_mapping_maintenance_predicates() {
        assert!(OperationKind::CreateUser.is_create());
        assert!(OperationKind::CreateGroup.is_create());
        assert!(!OperationKind::UpdateUser.is_create());

        assert!(OperationKind::DeactivateUser.removes_mapping());
        assert!(OperationKind::DeleteUser.removes_mapping());
        assert!(OperationKind::DeleteGroup.removes_mapping());
        assert!(!OperationKind::UpdateGroup.removes_mapping());

        assert!(OperationKind::DeleteUser.is_hard_delete());
        assert!(!OperationKind::DeactivateUser.is_hard_delete());
    }

    #[test]
    fn test_resource_paths() {
        assert_eq!(OperationKind::CreateUser.resource_path(), "Users");
        assert_eq!(OperationKind::DeactivateUser.resource_path(), "Users");
        assert_eq!(OperationKind::AddGroupMember.resource_path(), "Groups");
        assert_eq!(OperationKind::DeleteGroup.resource_path(), "Groups");
    }

    #[test]
    fn test_parse_enabled_operations_skips_unknown() {
        let value = serde_json::json!(["CREATE_USER", "NOT_A_THING", "DELETE_GROUP"]);
        let ops = parse_enabled_operations(&value);
        assert_eq!(ops, vec![OperationKind::CreateUser, OperationKind::DeleteGroup]);
    }

    #[test]
    fn test_parse_enabled_operations_tolerates_non_array() {
        assert!(parse_enabled_operations(&serde_json::json!({})).is_empty());
        assert!(parse_enabled_operations(&serde_json::json!(null)).is_empty());
    }

    #[test]
    fn test_operations_value_roundtrip() {
        let ops = vec![OperationKind::CreateUser, OperationKind::AddGroupMember];
        let value = operations_to_value(&ops);
        assert_eq!(parse_enabled_operations(&value), ops);
    }

    #[test]
    fn test_delete_action_roundtrip() {
        for action in [DeleteAction::Deactivate, DeleteAction::HardDelete] {
            let parsed: DeleteAction = action.as_str().parse().unwrap();
            assert_eq!(action, parsed);
        }
    }
}
