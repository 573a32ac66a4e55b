use super::{ensure_membership_query, unsupported_query, Index};
use crate::Result;
use async_trait::async_trait;
use docindex_protocol::{FindResult, IndexKind, IndexQuery, IndexedObject, ObjectPointer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Type key of objects without a type reference.
pub const UNTYPED: &str = "@untyped";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchemaPayload {
    types: BTreeMap<String, BTreeSet<ObjectPointer>>,
}

/// Exact lookup by typename.
pub struct SchemaMatchIndex {
    identifier: String,
    kind: IndexKind,
    types: BTreeMap<String, BTreeSet<ObjectPointer>>,
    type_of: BTreeMap<ObjectPointer, String>,
}

impl SchemaMatchIndex {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: IndexKind::SchemaMatch,
            types: BTreeMap::new(),
            type_of: BTreeMap::new(),
        }
    }

    pub fn load(identifier: impl Into<String>, payload: &[u8]) -> Result<Self> {
        let payload: SchemaPayload = serde_json::from_slice(payload)?;
        let mut index = Self::new(identifier);
        for (typename, pointers) in payload.types {
            for pointer in &pointers {
                index.type_of.insert(pointer.clone(), typename.clone());
            }
            if !pointers.is_empty() {
                index.types.insert(typename, pointers);
            }
        }
        Ok(index)
    }

    fn detach(&mut self, pointer: &ObjectPointer) -> bool {
        let Some(typename) = self.type_of.remove(pointer) else {
            return false;
        };
        if let Some(set) = self.types.get_mut(&typename) {
            set.remove(pointer);
            if set.is_empty() {
                self.types.remove(&typename);
            }
        }
        true
    }
}

#[async_trait]
impl Index for SchemaMatchIndex {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> &IndexKind {
        &self.kind
    }

    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool> {
        let typename = object.typename.as_deref().unwrap_or(UNTYPED);
        if self.type_of.get(pointer).map(String::as_str) == Some(typename) {
            return Ok(false);
        }
        self.detach(pointer);
        self.types
            .entry(typename.to_string())
            .or_default()
            .insert(pointer.clone());
        self.type_of.insert(pointer.clone(), typename.to_string());
        Ok(true)
    }

    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool> {
        Ok(self.detach(pointer))
    }

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>> {
        ensure_membership_query(&self.kind, query)?;
        if query.field_value.is_some() {
            return Err(unsupported_query(&self.kind, "field values"));
        }

        let requested: BTreeSet<&str> = query.typenames.iter().map(String::as_str).collect();
        let hits = self
            .types
            .iter()
            .filter(|(typename, _)| {
                let matches = requested.is_empty() || requested.contains(typename.as_str());
                matches != query.inverted
            })
            .flat_map(|(_, pointers)| pointers.iter().cloned())
            .map(FindResult::unranked)
            .collect();
        Ok(hits)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let payload = SchemaPayload {
            types: self.types.clone(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexerError;
    use docindex_protocol::GraphQueryKind;
    use pretty_assertions::assert_eq;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    fn pointers(results: Vec<FindResult>) -> Vec<ObjectPointer> {
        let mut out: Vec<_> = results.into_iter().map(|r| r.pointer).collect();
        out.sort();
        out
    }

    async fn populated() -> SchemaMatchIndex {
        let mut index = SchemaMatchIndex::new("schema");
        for (id, typename) in [("a1", "A"), ("a2", "A"), ("b1", "B"), ("c1", "C")] {
            let object = IndexedObject::new(id).with_typename(typename);
            index.update(&p(id), &object).await.unwrap();
        }
        index.update(&p("u1"), &IndexedObject::new("u1")).await.unwrap();
        index
    }

    #[tokio::test]
    async fn typenames_are_ored() {
        let index = populated().await;
        let hits = index.find(&IndexQuery::typenames(["A", "B"])).await.unwrap();
        assert_eq!(pointers(hits), vec![p("a1"), p("a2"), p("b1")]);
    }

    #[tokio::test]
    async fn empty_filter_and_inversion() {
        let index = populated().await;
        assert_eq!(index.find(&IndexQuery::default()).await.unwrap().len(), 5);
        assert!(index
            .find(&IndexQuery::default().inverted())
            .await
            .unwrap()
            .is_empty());

        let hits = index
            .find(&IndexQuery::typenames(["A"]).inverted())
            .await
            .unwrap();
        assert_eq!(pointers(hits), vec![p("b1"), p("c1"), p("u1")]);
    }

    #[tokio::test]
    async fn untyped_objects_use_sentinel() {
        let index = populated().await;
        let hits = index.find(&IndexQuery::typenames([UNTYPED])).await.unwrap();
        assert_eq!(pointers(hits), vec![p("u1")]);
    }

    #[tokio::test]
    async fn update_is_idempotent_and_moves_type() {
        let mut index = SchemaMatchIndex::new("schema");
        let object = IndexedObject::new("x").with_typename("A");
        assert!(index.update(&p("x"), &object).await.unwrap());
        assert!(!index.update(&p("x"), &object).await.unwrap());

        let retyped = IndexedObject::new("x").with_typename("B");
        assert!(index.update(&p("x"), &retyped).await.unwrap());
        assert!(index
            .find(&IndexQuery::typenames(["A"]))
            .await
            .unwrap()
            .is_empty());
        assert!(index.remove(&p("x")).await.unwrap());
        assert!(index.find(&IndexQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_trip_preserves_results() {
        let index = populated().await;
        let restored = SchemaMatchIndex::load("schema", &index.serialize().unwrap()).unwrap();
        let query = IndexQuery::typenames(["A", "C"]);
        assert_eq!(
            pointers(restored.find(&query).await.unwrap()),
            pointers(index.find(&query).await.unwrap())
        );
    }

    #[tokio::test]
    async fn graph_query_is_rejected() {
        let index = populated().await;
        let query = IndexQuery::graph(GraphQueryKind::InboundReference, vec![p("a1")], None);
        assert!(matches!(
            index.find(&query).await,
            Err(IndexerError::InvariantViolation(_))
        ));
    }
}
