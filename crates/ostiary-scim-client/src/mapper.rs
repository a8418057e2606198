//! SCIM resource translation.
//!
//! Maps local entity snapshots to SCIM JSON resources and builds the PATCH
//! envelopes for deactivation and membership changes. The translator is
//! stateless and deterministic: the same inputs produce the same payloads.
//!
//! Attribute mappings are tables of `(scim_target_path, source_expression)`
//! entries. Source expressions are either the literal strings `"true"` /
//! `"false"` (coerced to booleans) or `$.`-rooted paths resolved against
//! the snapshot view `{user: {...}, profile: {...}, group: {...}}`. Target
//! paths support dotted nesting and bracket indexing (`emails[0].value`);
//! intermediate objects and arrays are constructed lazily so assignments
//! never fail for in-range indices.

use serde_json::{json, Map, Value};

/// SCIM core User schema URN.
pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM core Group schema URN.
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// SCIM PatchOp message schema URN.
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Default attribute mapping applied when a destination has no custom one.
const DEFAULT_USER_MAPPING: &[(&str, &str)] = &[
    ("userName", "$.user.username"),
    ("externalId", "$.user.id"),
    ("name.givenName", "$.profile.given_name"),
    ("name.familyName", "$.profile.family_name"),
    ("emails[0].value", "$.user.email"),
    ("emails[0].primary", "true"),
];

/// Serialize a local user snapshot into a SCIM User resource.
///
/// `mapping` is the destination's attribute-mapping object; an empty object
/// (or anything that is not a non-empty object) selects the default
/// mapping. `scim_id` is included as the top-level `id` for updates.
#[must_use]
pub fn user_resource(snapshot: &Value, mapping: &Value, scim_id: Option<&str>) -> Value {
    let mut resource = json!({ "schemas": [USER_SCHEMA] });
    if let Some(id) = scim_id {
        resource["id"] = Value::String(id.to_string());
    }

    match mapping.as_object().filter(|m| !m.is_empty()) {
        Some(custom) => apply_mapping_entries(&mut resource, snapshot, custom),
        None => {
            for (target, source) in DEFAULT_USER_MAPPING {
                if let Some(value) = resolve_source(source, snapshot) {
                    set_target_path(&mut resource, target, value);
                }
            }
        }
    }

    resource
}

/// Serialize a local group snapshot into a SCIM Group resource.
#[must_use]
pub fn group_resource(snapshot: &Value, scim_id: Option<&str>) -> Value {
    let mut resource = json!({ "schemas": [GROUP_SCHEMA] });
    if let Some(id) = scim_id {
        resource["id"] = Value::String(id.to_string());
    }
    if let Some(display_name) = resolve_source("$.group.displayName", snapshot) {
        resource["displayName"] = display_name;
    }
    if let Some(external_id) = resolve_source("$.group.id", snapshot) {
        resource["externalId"] = external_id;
    }
    resource
}

/// PATCH body that deactivates a user (`active = false`).
#[must_use]
pub fn deactivate_patch() -> Value {
    json!({
        "schemas": [PATCH_OP_SCHEMA],
        "Operations": [
            { "op": "replace", "path": "active", "value": false }
        ]
    })
}

/// PATCH body that adds a member to a group.
#[must_use]
pub fn add_member_patch(user_scim_id: &str) -> Value {
    json!({
        "schemas": [PATCH_OP_SCHEMA],
        "Operations": [
            {
                "op": "add",
                "path": "members",
                "value": [ { "value": user_scim_id } ]
            }
        ]
    })
}

/// PATCH body that removes a member from a group.
#[must_use]
pub fn remove_member_patch(user_scim_id: &str) -> Value {
    json!({
        "schemas": [PATCH_OP_SCHEMA],
        "Operations": [
            {
                "op": "remove",
                "path": format!("members[value eq \"{user_scim_id}\"]")
            }
        ]
    })
}

fn apply_mapping_entries(resource: &mut Value, snapshot: &Value, entries: &Map<String, Value>) {
    for (target, source) in entries {
        let Some(expr) = source.as_str() else {
            continue;
        };
        if let Some(value) = resolve_source(expr, snapshot) {
            set_target_path(resource, target, value);
        }
    }
}

/// Resolve a source expression against the snapshot view.
///
/// Returns `None` for missing or null leaves and for unrecognized
/// expressions, so absent inputs are omitted from the payload rather than
/// serialized as null.
#[must_use]
pub fn resolve_source(expression: &str, snapshot: &Value) -> Option<Value> {
    match expression {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }

    let path = expression.strip_prefix("$.")?;
    let mut current = snapshot;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current.clone())
    }
}

/// One segment of a target path.
#[derive(Debug, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a target path like `emails[0].value` into segments.
fn parse_target_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        match part.find('[') {
            Some(bracket) => {
                let key = &part[..bracket];
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                let mut rest = &part[bracket..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let Some(close) = stripped.find(']') else {
                        break;
                    };
                    if let Ok(index) = stripped[..close].parse::<usize>() {
                        segments.push(PathSegment::Index(index));
                    }
                    rest = &stripped[close + 1..];
                }
            }
            None => {
                if !part.is_empty() {
                    segments.push(PathSegment::Key(part.to_string()));
                }
            }
        }
    }
    segments
}

/// Assign `value` at `path` inside `root`, lazily constructing intermediate
/// objects and growing arrays with nulls as needed.
pub fn set_target_path(root: &mut Value, path: &str, value: Value) {
    let segments = parse_target_path(path);
    if segments.is_empty() {
        return;
    }

    let mut current = root;
    for (position, segment) in segments.iter().enumerate() {
        let last = position == segments.len() - 1;
        match segment {
            PathSegment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else { return };
                if last {
                    map.insert(key.clone(), value);
                    return;
                }
                current = map.entry(key.clone()).or_insert(Value::Null);
            }
            PathSegment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let Value::Array(array) = current else { return };
                while array.len() <= *index {
                    array.push(Value::Null);
                }
                if last {
                    array[*index] = value;
                    return;
                }
                current = &mut array[*index];
            }
        }
    }
}
