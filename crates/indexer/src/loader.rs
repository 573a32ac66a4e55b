//! Document loading boundary.

use crate::metadata::HeadsMap;
use crate::{IndexerError, Result};
use async_trait::async_trait;
use docindex_protocol::{Heads, IndexedObject, ObjectPointer, ObjectSnapshot};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Finite sequence of snapshot batches. Not restartable; ask the loader again to
/// start over.
#[async_trait]
pub trait SnapshotStream: Send {
    /// Next non-empty batch, or `None` once every requested pointer was visited.
    async fn next_batch(&mut self) -> Result<Option<Vec<ObjectSnapshot>>>;
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Stream the current state of `pointers`, at most `chunk_size` per batch.
    /// Pointers whose object no longer exists are left out.
    async fn load_documents(
        &self,
        pointers: &HeadsMap,
        chunk_size: usize,
    ) -> Result<Box<dyn SnapshotStream>>;
}

type Documents = BTreeMap<ObjectPointer, (IndexedObject, Heads)>;

/// In-process document source.
#[derive(Clone, Default)]
pub struct MemoryDocumentLoader {
    documents: Arc<RwLock<Documents>>,
}

impl MemoryDocumentLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, pointer: ObjectPointer, object: IndexedObject, heads: Heads) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(pointer, (object, heads));
        }
    }

    pub fn remove(&self, pointer: &ObjectPointer) -> bool {
        self.documents
            .write()
            .map(|mut documents| documents.remove(pointer).is_some())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentLoader for MemoryDocumentLoader {
    async fn load_documents(
        &self,
        pointers: &HeadsMap,
        chunk_size: usize,
    ) -> Result<Box<dyn SnapshotStream>> {
        Ok(Box::new(MemorySnapshotStream {
            documents: self.documents.clone(),
            remaining: pointers.keys().cloned().collect(),
            chunk_size: chunk_size.max(1),
        }))
    }
}

struct MemorySnapshotStream {
    documents: Arc<RwLock<Documents>>,
    remaining: VecDeque<ObjectPointer>,
    chunk_size: usize,
}

#[async_trait]
impl SnapshotStream for MemorySnapshotStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<ObjectSnapshot>>> {
        while !self.remaining.is_empty() {
            let take = self.chunk_size.min(self.remaining.len());
            let chunk: Vec<ObjectPointer> = self.remaining.drain(..take).collect();

            let documents = self
                .documents
                .read()
                .map_err(|_| IndexerError::Other("document map lock poisoned".to_string()))?;
            let batch: Vec<ObjectSnapshot> = chunk
                .into_iter()
                .filter_map(|pointer| {
                    let (object, heads) = documents.get(&pointer)?;
                    Some(ObjectSnapshot::new(pointer, object.clone(), heads.clone()))
                })
                .collect();
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    #[tokio::test]
    async fn streams_in_chunks_and_skips_missing() {
        let loader = MemoryDocumentLoader::new();
        for id in ["a", "b", "c"] {
            loader.put(p(id), IndexedObject::new(id), Heads::new(["h"]));
        }
        let requested: HeadsMap = ["a", "b", "gone", "c"]
            .into_iter()
            .map(|id| (p(id), Heads::new(["h"])))
            .collect();

        let mut stream = loader.load_documents(&requested, 2).await.unwrap();
        let mut sizes = Vec::new();
        while let Some(batch) = stream.next_batch().await.unwrap() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn entirely_missing_request_ends_immediately() {
        let loader = MemoryDocumentLoader::new();
        let requested: HeadsMap = [(p("gone"), Heads::new(["h"]))].into_iter().collect();
        let mut stream = loader.load_documents(&requested, 8).await.unwrap();
        assert!(stream.next_batch().await.unwrap().is_none());
    }
}
