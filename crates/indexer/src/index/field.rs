use super::{ensure_membership_query, unsupported_query, Index};
use crate::Result;
use async_trait::async_trait;
use docindex_protocol::{FindResult, IndexKind, IndexQuery, IndexedObject, ObjectPointer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FieldPayload {
    field: String,
    values: BTreeMap<String, BTreeSet<ObjectPointer>>,
}

/// Exact lookup by the value of one data field.
///
/// Values are keyed by their canonical JSON text, so `1` and `"1"` stay distinct.
pub struct FieldMatchIndex {
    identifier: String,
    kind: IndexKind,
    field: String,
    values: BTreeMap<String, BTreeSet<ObjectPointer>>,
    value_of: BTreeMap<ObjectPointer, String>,
}

fn value_key(value: &Value) -> String {
    value.to_string()
}

impl FieldMatchIndex {
    pub fn new(identifier: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            identifier: identifier.into(),
            kind: IndexKind::field_match(field.clone()),
            field,
            values: BTreeMap::new(),
            value_of: BTreeMap::new(),
        }
    }

    pub fn load(identifier: impl Into<String>, payload: &[u8]) -> Result<Self> {
        let payload: FieldPayload = serde_json::from_slice(payload)?;
        let mut index = Self::new(identifier, payload.field);
        for (key, pointers) in payload.values {
            for pointer in &pointers {
                index.value_of.insert(pointer.clone(), key.clone());
            }
            if !pointers.is_empty() {
                index.values.insert(key, pointers);
            }
        }
        Ok(index)
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    fn detach(&mut self, pointer: &ObjectPointer) -> bool {
        let Some(key) = self.value_of.remove(pointer) else {
            return false;
        };
        if let Some(set) = self.values.get_mut(&key) {
            set.remove(pointer);
            if set.is_empty() {
                self.values.remove(&key);
            }
        }
        true
    }
}

#[async_trait]
impl Index for FieldMatchIndex {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> &IndexKind {
        &self.kind
    }

    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool> {
        let Some(value) = object.data.get(&self.field) else {
            return Ok(self.detach(pointer));
        };
        let key = value_key(value);
        if self.value_of.get(pointer) == Some(&key) {
            return Ok(false);
        }
        self.detach(pointer);
        self.values
            .entry(key.clone())
            .or_default()
            .insert(pointer.clone());
        self.value_of.insert(pointer.clone(), key);
        Ok(true)
    }

    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool> {
        Ok(self.detach(pointer))
    }

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>> {
        ensure_membership_query(&self.kind, query)?;
        if !query.typenames.is_empty() {
            return Err(unsupported_query(&self.kind, "typename filters"));
        }

        let wanted = query.field_value.as_ref().map(value_key);
        let hits = self
            .values
            .iter()
            .filter(|(key, _)| {
                let matches = wanted.as_ref().map_or(true, |wanted| wanted == *key);
                matches != query.inverted
            })
            .flat_map(|(_, pointers)| pointers.iter().cloned())
            .map(FindResult::unranked)
            .collect();
        Ok(hits)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let payload = FieldPayload {
            field: self.field.clone(),
            values: self.values.clone(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}
