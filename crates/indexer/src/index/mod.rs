//! The `Index` contract and its built-in kinds.

mod field;
mod full_text;
mod graph;
mod schema;
mod vector;

pub use field::FieldMatchIndex;
pub use full_text::FullTextIndex;
pub use graph::GraphIndex;
pub use schema::{SchemaMatchIndex, UNTYPED};
pub use vector::{VectorConfig, VectorIndex};

use crate::{IndexerError, Result};
use async_trait::async_trait;
use docindex_protocol::{FindResult, IndexKind, IndexQuery, IndexedObject, ObjectPointer};

/// One search modality over the indexed objects.
///
/// Instances are created unopened; the owner calls [`Index::open`] before routing
/// objects into it and [`Index::close`] once it is dropped from the live set.
#[async_trait]
pub trait Index: Send + Sync {
    fn identifier(&self) -> &str;

    fn kind(&self) -> &IndexKind;

    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Index `object` under `pointer`. Returns whether the index content changed;
    /// applying the same content twice returns `false` the second time.
    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool>;

    /// Returns whether `pointer` was present.
    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool>;

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>>;

    /// Kind-specific payload, stored after the snapshot header.
    fn serialize(&self) -> Result<Vec<u8>>;
}

pub(crate) fn unsupported_query(kind: &IndexKind, what: &str) -> IndexerError {
    IndexerError::InvariantViolation(format!("{kind} index does not support {what}"))
}

/// Reject text and graph parts on indexes that only answer membership queries.
pub(crate) fn ensure_membership_query(kind: &IndexKind, query: &IndexQuery) -> Result<()> {
    if query.graph.is_some() {
        return Err(unsupported_query(kind, "graph queries"));
    }
    if query.text.is_some() {
        return Err(unsupported_query(kind, "text queries"));
    }
    Ok(())
}
