use super::{unsupported_query, Index};
use crate::Result;
use async_trait::async_trait;
use docindex_protocol::{
    FindResult, IndexKind, IndexQuery, IndexedObject, ObjectPointer, TextQueryKind,
};
use docindex_search::{break_into_chunks, extract_text_blocks, Bm25Index, TextSearch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
struct FullTextPayload {
    chunk_size: usize,
    documents: BTreeMap<ObjectPointer, Vec<String>>,
}

/// Free-text search over the string leaves of object data.
///
/// Only the chunk lists are persisted; the search structure is rebuilt from them on load.
pub struct FullTextIndex {
    identifier: String,
    kind: IndexKind,
    chunk_size: usize,
    documents: BTreeMap<ObjectPointer, Vec<String>>,
    search: Box<dyn TextSearch>,
}

impl FullTextIndex {
    pub fn new(identifier: impl Into<String>, chunk_size: usize) -> Self {
        Self::with_search(identifier, chunk_size, Box::new(Bm25Index::new()))
    }

    /// Use a different search capability than the default BM25.
    pub fn with_search(
        identifier: impl Into<String>,
        chunk_size: usize,
        search: Box<dyn TextSearch>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            kind: IndexKind::FullText,
            chunk_size,
            documents: BTreeMap::new(),
            search,
        }
    }

    pub fn load(identifier: impl Into<String>, payload: &[u8]) -> Result<Self> {
        let payload: FullTextPayload = serde_json::from_slice(payload)?;
        let mut index = Self::new(identifier, payload.chunk_size);
        for (pointer, chunks) in payload.documents {
            if chunks.is_empty() {
                continue;
            }
            index.search.insert(pointer.as_str(), &chunks);
            index.documents.insert(pointer, chunks);
        }
        Ok(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn detach(&mut self, pointer: &ObjectPointer) -> bool {
        self.search.remove(pointer.as_str());
        self.documents.remove(pointer).is_some()
    }
}

#[async_trait]
impl Index for FullTextIndex {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> &IndexKind {
        &self.kind
    }

    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool> {
        let blocks = extract_text_blocks(&object.data);
        let chunks = break_into_chunks(&blocks, self.chunk_size)?;
        if chunks.is_empty() {
            return Ok(self.detach(pointer));
        }
        if self.documents.get(pointer) == Some(&chunks) {
            return Ok(false);
        }
        self.search.insert(pointer.as_str(), &chunks);
        self.documents.insert(pointer.clone(), chunks);
        Ok(true)
    }

    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool> {
        Ok(self.detach(pointer))
    }

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>> {
        let text = match &query.text {
            Some(text) if text.kind == TextQueryKind::Text => text,
            Some(_) => return Err(unsupported_query(&self.kind, "vector queries")),
            None => return Err(unsupported_query(&self.kind, "queries without text")),
        };
        if query.graph.is_some() {
            return Err(unsupported_query(&self.kind, "graph queries"));
        }

        let hits = self.search.search(&text.query, self.documents.len())?;
        Ok(hits
            .into_iter()
            .map(|(id, score)| FindResult::new(ObjectPointer::from_raw(id), score))
            .collect())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let payload = FullTextPayload {
            chunk_size: self.chunk_size,
            documents: self.documents.clone(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}
