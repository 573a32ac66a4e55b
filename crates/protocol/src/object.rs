use crate::{Heads, ObjectPointer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key marking a JSON object as an encoded reference: `{"/": "<pointer>"}`.
pub const REFERENCE_KEY: &str = "/";

/// Endpoints of a relation-typed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEndpoints {
    pub source: ObjectPointer,
    pub target: ObjectPointer,
}

/// Object content as seen by the indexes: user data plus structural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedObject {
    pub id: String,
    /// Type reference of the object; `None` for untyped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typename: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationEndpoints>,
    #[serde(default)]
    pub deleted: bool,
}

impl IndexedObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            typename: None,
            data: Map::new(),
            relation: None,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_typename(mut self, typename: impl Into<String>) -> Self {
        self.typename = Some(typename.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_relation(mut self, source: ObjectPointer, target: ObjectPointer) -> Self {
        self.relation = Some(RelationEndpoints { source, target });
        self
    }

    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }
}

/// Encode a reference to `target` the way it appears inside object data.
#[must_use]
pub fn reference(target: &ObjectPointer) -> Value {
    let mut map = Map::new();
    map.insert(REFERENCE_KEY.to_string(), Value::String(target.to_string()));
    Value::Object(map)
}

/// Decode a reference value; anything but a single-key `{"/": string}` object is data.
#[must_use]
pub fn as_reference(value: &Value) -> Option<ObjectPointer> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(REFERENCE_KEY)
        .and_then(Value::as_str)
        .map(ObjectPointer::from_raw)
}

/// A loaded object pinned to the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub pointer: ObjectPointer,
    pub object: IndexedObject,
    pub heads: Heads,
}

impl ObjectSnapshot {
    #[must_use]
    pub fn new(pointer: ObjectPointer, object: IndexedObject, heads: Heads) -> Self {
        Self {
            pointer,
            object,
            heads,
        }
    }
}
