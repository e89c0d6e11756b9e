//! Canonical owner identity of a resource payload
//!
//! The backend has spelled the owner of a post many ways over time. Each
//! candidate location is a [`FieldPath`] and the tables below are walked in
//! priority order; the first non-null scalar wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Display name used when a payload names nobody
pub const UNKNOWN_OWNER: &str = "Unknown user";

/// Where to look for a field inside a loosely-typed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    /// Top-level key
    Key(&'static str),
    /// Key inside a top-level object
    Nested(&'static str, &'static str),
}

impl FieldPath {
    /// Resolve to a string; numbers are rendered, blanks and other types skipped
    pub fn resolve(&self, payload: &Value) -> Option<String> {
        let value = match *self {
            FieldPath::Key(key) => payload.get(key)?,
            FieldPath::Nested(outer, key) => payload.get(outer)?.as_object()?.get(key)?,
        };
        match value {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            other => {
                debug!(field = ?self, value = %other, "Identity field present but unusable, skipping");
                None
            }
        }
    }
}

/// Owner id candidates, highest priority first
pub const OWNER_ID_PATHS: &[FieldPath] = &[
    FieldPath::Nested("author", "userId"),
    FieldPath::Nested("author", "id"),
    FieldPath::Nested("author", "_id"),
    FieldPath::Nested("user", "userId"),
    FieldPath::Nested("user", "id"),
    FieldPath::Nested("user", "_id"),
    FieldPath::Nested("owner", "id"),
    FieldPath::Key("authorId"),
    FieldPath::Key("userId"),
    FieldPath::Key("ownerId"),
    FieldPath::Key("createdBy"),
    FieldPath::Key("user_id"),
    FieldPath::Key("author_id"),
    // `author` as a bare string is an id on older payloads
    FieldPath::Key("author"),
    FieldPath::Nested("author", "username"),
    FieldPath::Nested("user", "username"),
    FieldPath::Key("username"),
    FieldPath::Key("authorUsername"),
];

/// Display name candidates, highest priority first
pub const DISPLAY_NAME_PATHS: &[FieldPath] = &[
    FieldPath::Nested("author", "displayName"),
    FieldPath::Nested("author", "name"),
    FieldPath::Nested("author", "fullName"),
    FieldPath::Nested("author", "username"),
    FieldPath::Nested("user", "displayName"),
    FieldPath::Nested("user", "name"),
    FieldPath::Nested("user", "username"),
    FieldPath::Key("authorName"),
    FieldPath::Key("userName"),
    FieldPath::Key("username"),
];

/// First path in `paths` that resolves
pub fn first_match(payload: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| path.resolve(payload))
}

/// Canonical owner of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub id: Option<String>,
    pub display_name: String,
}

/// Derive the owner identity; a missing id is logged, never an error
pub fn owner_identity(payload: &Value) -> OwnerIdentity {
    let id = first_match(payload, OWNER_ID_PATHS);
    if id.is_none() {
        debug!(
            resource_id = ?FieldPath::Key("id").resolve(payload),
            "No owner id found in resource payload"
        );
    }
    let display_name =
        first_match(payload, DISPLAY_NAME_PATHS).unwrap_or_else(|| UNKNOWN_OWNER.to_string());
    OwnerIdentity { id, display_name }
}

/// A resource as handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default = "unknown_owner")]
    pub author_name: String,
    /// Remaining payload fields, untouched
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn unknown_owner() -> String {
    UNKNOWN_OWNER.to_string()
}

impl Resource {
    /// Build from a raw payload, filling the canonical owner fields
    pub fn from_raw(payload: Value) -> Self {
        let identity = owner_identity(&payload);
        let id = FieldPath::Key("id")
            .resolve(&payload)
            .or_else(|| FieldPath::Key("_id").resolve(&payload));

        let mut fields = match payload {
            Value::Object(object) => object,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        for key in ["id", "authorId", "authorName"] {
            fields.remove(key);
        }

        Self {
            id,
            author_id: identity.id,
            author_name: identity.display_name,
            fields,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
