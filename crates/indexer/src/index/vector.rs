use super::{unsupported_query, Index};
use crate::{IndexerError, Result};
use async_trait::async_trait;
use docindex_protocol::{
    FindResult, IndexKind, IndexQuery, IndexedObject, ObjectPointer, TextQueryKind,
};
use docindex_search::{break_into_chunks, extract_text_blocks, DEFAULT_CHUNK_SIZE};
use docindex_vector_store::{embed_chunks, ChunkCombination, Embedder, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimension: usize,
    pub combination: ChunkCombination,
    pub min_similarity: f32,
    pub chunk_size: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: 256,
            combination: ChunkCombination::Mean,
            min_similarity: 0.2,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VectorPayload {
    config: VectorConfig,
    store: VectorStore,
    /// Content fingerprint per pointer, so unchanged text skips re-embedding.
    fingerprints: BTreeMap<ObjectPointer, String>,
}

/// Similarity search over one embedding per object.
pub struct VectorIndex {
    identifier: String,
    kind: IndexKind,
    config: VectorConfig,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    fingerprints: BTreeMap<ObjectPointer, String>,
    opened: bool,
}

fn fingerprint(chunks: &[String], combination: ChunkCombination) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("{combination:?}").as_bytes());
    for chunk in chunks {
        hasher.update(&(chunk.len() as u64).to_le_bytes());
        hasher.update(chunk.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

impl VectorIndex {
    pub fn new(
        identifier: impl Into<String>,
        config: VectorConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let store = VectorStore::new(config.dimension);
        Self {
            identifier: identifier.into(),
            kind: IndexKind::Vector,
            config,
            embedder,
            store,
            fingerprints: BTreeMap::new(),
            opened: false,
        }
    }

    /// Rebuild from a payload; `embedder` picks the model for the stored config.
    pub fn load(
        identifier: impl Into<String>,
        payload: &[u8],
        embedder: impl FnOnce(&VectorConfig) -> Arc<dyn Embedder>,
    ) -> Result<Self> {
        let payload: VectorPayload = serde_json::from_slice(payload)?;
        if payload.store.dimension() != payload.config.dimension {
            return Err(IndexerError::InvariantViolation(format!(
                "vector payload dimension {} does not match configured {}",
                payload.store.dimension(),
                payload.config.dimension
            )));
        }
        payload.store.validate()?;

        let embedder = embedder(&payload.config);
        let mut index = Self::new(identifier, payload.config, embedder);
        index.store = payload.store;
        index.fingerprints = payload.fingerprints;
        Ok(index)
    }

    #[must_use]
    pub fn config(&self) -> &VectorConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn detach(&mut self, pointer: &ObjectPointer) -> bool {
        self.fingerprints.remove(pointer);
        self.store.remove(pointer)
    }
}

#[async_trait]
impl Index for VectorIndex {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> &IndexKind {
        &self.kind
    }

    async fn open(&mut self) -> Result<()> {
        if self.embedder.dimension() != self.config.dimension {
            return Err(IndexerError::InvariantViolation(format!(
                "embedder '{}' produces {} dimensions, index expects {}",
                self.embedder.model_id(),
                self.embedder.dimension(),
                self.config.dimension
            )));
        }
        self.embedder.open().await?;
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.embedder.close().await?;
        Ok(())
    }

    async fn update(&mut self, pointer: &ObjectPointer, object: &IndexedObject) -> Result<bool> {
        let blocks = extract_text_blocks(&object.data);
        let chunks = break_into_chunks(&blocks, self.config.chunk_size)?;
        if chunks.is_empty() {
            return Ok(self.detach(pointer));
        }

        let print = fingerprint(&chunks, self.config.combination);
        if self.fingerprints.get(pointer) == Some(&print) {
            return Ok(false);
        }

        let vector = embed_chunks(self.embedder.as_ref(), &chunks, self.config.combination).await?;
        self.store.upsert(pointer.clone(), vector)?;
        self.fingerprints.insert(pointer.clone(), print);
        Ok(true)
    }

    async fn remove(&mut self, pointer: &ObjectPointer) -> Result<bool> {
        Ok(self.detach(pointer))
    }

    async fn find(&self, query: &IndexQuery) -> Result<Vec<FindResult>> {
        let text = match &query.text {
            Some(text) if text.kind == TextQueryKind::Vector => text,
            Some(_) => return Err(unsupported_query(&self.kind, "full-text queries")),
            None => return Err(unsupported_query(&self.kind, "queries without text")),
        };
        if query.graph.is_some() {
            return Err(unsupported_query(&self.kind, "graph queries"));
        }
        if !self.opened {
            return Err(IndexerError::InvariantViolation(format!(
                "vector index {} queried before open",
                self.identifier
            )));
        }

        let embedding = embed_chunks(
            self.embedder.as_ref(),
            &[text.query.clone()],
            self.config.combination,
        )
        .await?;
        let hits = self
            .store
            .search(&embedding, self.config.min_similarity, self.store.len())?;
        Ok(hits
            .into_iter()
            .map(|(pointer, score)| FindResult::new(pointer, score))
            .collect())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            config: &'a VectorConfig,
            store: &'a VectorStore,
            fingerprints: &'a BTreeMap<ObjectPointer, String>,
        }
        Ok(serde_json::to_vec(&Borrowed {
            config: &self.config,
            store: &self.store,
            fingerprints: &self.fingerprints,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_vector_store::HashingEmbedder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn p(id: &str) -> ObjectPointer {
        ObjectPointer::new("s", "d", id)
    }

    fn note(id: &str, text: &str) -> IndexedObject {
        IndexedObject::new(id).with_field("content", json!(text))
    }

    fn config() -> VectorConfig {
        VectorConfig {
            dimension: 64,
            min_similarity: 0.3,
            ..VectorConfig::default()
        }
    }

    async fn opened() -> VectorIndex {
        let mut index = VectorIndex::new("vec", config(), Arc::new(HashingEmbedder::new(64)));
        index.open().await.unwrap();
        index
    }

    #[tokio::test]
    async fn similar_text_ranks_first() {
        let mut index = opened().await;
        index
            .update(&p("seal"), &note("seal", "harbor seals migrate along the coast"))
            .await
            .unwrap();
        index
            .update(&p("tax"), &note("tax", "quarterly revenue tax filing deadline"))
            .await
            .unwrap();

        let hits = index
            .find(&IndexQuery::vector("seals migrate coast"))
            .await
            .unwrap();
        assert_eq!(hits.first().map(|h| h.pointer.clone()), Some(p("seal")));
        assert!(hits.iter().all(|h| h.rank >= 0.3));
    }

    #[tokio::test]
    async fn update_skips_unchanged_text() {
        let mut index = opened().await;
        let object = note("x", "same words");
        assert!(index.update(&p("x"), &object).await.unwrap());
        assert!(!index.update(&p("x"), &object).await.unwrap());
        assert!(index.remove(&p("x")).await.unwrap());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn mismatched_embedder_fails_open() {
        let mut index = VectorIndex::new("vec", config(), Arc::new(HashingEmbedder::new(32)));
        assert!(matches!(
            index.open().await,
            Err(IndexerError::InvariantViolation(_))
        ));
        index.close().await.unwrap();
    }

    #[tokio::test]
    async fn round_trip_preserves_results() {
        let mut index = opened().await;
        index
            .update(&p("a"), &note("a", "graph databases store edges"))
            .await
            .unwrap();
        index
            .update(&p("b"), &note("b", "edges connect graph nodes"))
            .await
            .unwrap();

        let mut restored = VectorIndex::load("vec", &index.serialize().unwrap(), |config| {
            Arc::new(HashingEmbedder::new(config.dimension)) as Arc<dyn Embedder>
        })
        .unwrap();
        restored.open().await.unwrap();

        let query = IndexQuery::vector("graph edges");
        assert_eq!(
            restored.find(&query).await.unwrap(),
            index.find(&query).await.unwrap()
        );
        assert_eq!(restored.config(), index.config());
    }

    #[tokio::test]
    async fn text_query_is_rejected() {
        let index = opened().await;
        assert!(matches!(
            index.find(&IndexQuery::text("x")).await,
            Err(IndexerError::InvariantViolation(_))
        ));
    }
}
