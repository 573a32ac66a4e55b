//! File-backed document store shared by every command.
//!
//! Documents live next to the index data in the same [`FsKvStore`], under
//! `docs/{pointer}`, so saving a document and marking it dirty is one atomic write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use docindex_indexer::{
    DocumentLoader, EmbedderFactory, EngineConfig, FsKvStore, HeadsMap, IndexMetadataStore,
    IndexRegistry, IndexSnapshotStore, IndexingEngine, KvStore, RandomIdGenerator,
    SnapshotStream, VectorConfig, WriteBatch, CONFIG_FILE_NAME,
};
use docindex_protocol::{Heads, IndexedObject, ObjectPointer, ObjectSnapshot};
use docindex_vector_store::{Embedder, HashingEmbedder};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DOCUMENT_PREFIX: &str = "docs/";

fn document_key(pointer: &ObjectPointer) -> String {
    format!("{DOCUMENT_PREFIX}{pointer}")
}

/// Stored form of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub object: IndexedObject,
    pub heads: Heads,
}

/// One entry of an ingest file.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    #[serde(deserialize_with = "parse_pointer")]
    pub pointer: ObjectPointer,
    pub object: IndexedObject,
}

fn parse_pointer<'de, D>(deserializer: D) -> std::result::Result<ObjectPointer, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    ObjectPointer::parse(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!(
            "invalid object pointer '{raw}', expected space:document:object"
        ))
    })
}

/// Ingest files hold either a single entry or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocumentFile {
    Many(Vec<DocumentInput>),
    One(DocumentInput),
}

impl DocumentFile {
    pub fn into_inputs(self) -> Vec<DocumentInput> {
        match self {
            Self::Many(inputs) => inputs,
            Self::One(input) => vec![input],
        }
    }
}

/// Content hash of an object, used as its single head.
pub fn content_heads(object: &IndexedObject) -> Result<Heads> {
    let bytes = serde_json::to_vec(object).context("Failed to serialize object")?;
    Ok(Heads::new([blake3::hash(&bytes).to_hex().to_string()]))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub written: usize,
    pub unchanged: usize,
}

/// An opened store directory: KV data, engine config and the document view.
pub struct Workspace {
    root: PathBuf,
    kv: Arc<dyn KvStore>,
    config: EngineConfig,
    config_found: bool,
}

impl Workspace {
    pub async fn open(root: &Path) -> Result<Self> {
        let kv = FsKvStore::open(root)
            .await
            .with_context(|| format!("Failed to open store at {}", root.display()))?;
        let config_path = root.join(CONFIG_FILE_NAME);
        let loaded = EngineConfig::load(&config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config_found = loaded.is_some();

        Ok(Self {
            root: root.to_path_buf(),
            kv: Arc::new(kv),
            config: loaded.unwrap_or_default(),
            config_found,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Path of the config file when one was read.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_found.then(|| self.root.join(CONFIG_FILE_NAME))
    }

    pub fn metadata(&self) -> Arc<IndexMetadataStore> {
        Arc::new(IndexMetadataStore::new(self.kv.clone()))
    }

    pub async fn get_document(&self, pointer: &ObjectPointer) -> Result<Option<DocumentRecord>> {
        let Some(raw) = self.kv.get(&document_key(pointer)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw)
            .with_context(|| format!("Corrupt document record for {pointer}"))?;
        Ok(Some(record))
    }

    pub async fn document_count(&self) -> Result<usize> {
        Ok(self.kv.scan_prefix(DOCUMENT_PREFIX).await?.len())
    }

    /// Store `inputs` and mark every changed object dirty in the same write.
    pub async fn save_documents(
        &self,
        metadata: &IndexMetadataStore,
        inputs: Vec<DocumentInput>,
    ) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        let mut batch = WriteBatch::new();
        let mut touched = HeadsMap::new();

        for input in inputs {
            let heads = content_heads(&input.object)?;
            let existing = self.get_document(&input.pointer).await?;
            if existing.is_some_and(|record| record.heads == heads) {
                summary.unchanged += 1;
                continue;
            }
            let record = DocumentRecord {
                object: input.object,
                heads: heads.clone(),
            };
            batch.put(
                document_key(&input.pointer),
                serde_json::to_vec(&record).context("Failed to serialize document")?,
            );
            touched.insert(input.pointer, heads);
            summary.written += 1;
        }

        if touched.is_empty() {
            return Ok(summary);
        }

        let hook = metadata.commit_hook();
        hook
            .before_save(&mut batch, &touched)
            .context("Failed to mark documents dirty")?;
        metadata
            .commit(batch)
            .await
            .context("Failed to write documents")?;
        hook.after_save();
        log::debug!("Saved {} documents", summary.written);
        Ok(summary)
    }

    /// Engine over this store. Kinds already on disk are kept alongside the configured
    /// ones unless `prune` is set, in which case unconfigured indexes are dropped.
    pub async fn engine(&self, prune: bool) -> Result<IndexingEngine> {
        let embedders: EmbedderFactory = Arc::new(|config: &VectorConfig| {
            Arc::new(HashingEmbedder::new(config.dimension)) as Arc<dyn Embedder>
        });
        let registry = IndexRegistry::builtin(
            Arc::new(RandomIdGenerator),
            Some((embedders, self.config.vector.clone())),
        );
        let metadata = self.metadata();
        let snapshots = Arc::new(IndexSnapshotStore::new(self.kv.clone(), Arc::new(registry)));
        let loader = Arc::new(KvDocumentLoader::new(self.kv.clone()));

        let mut kinds = self.config.kinds.clone();
        if !prune {
            let on_disk = snapshots
                .load_index_kinds_from_disk()
                .await
                .context("Failed to read stored index kinds")?;
            for kind in on_disk.into_values() {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }

        let engine = IndexingEngine::new(metadata, snapshots, loader)
            .with_load_chunk_size(self.config.load_chunk_size);
        engine
            .reconcile(&kinds)
            .await
            .context("Failed to reconcile configured index kinds")?;
        Ok(engine)
    }
}

/// Reads objects back from `docs/` for the engine.
pub struct KvDocumentLoader {
    kv: Arc<dyn KvStore>,
}

impl KvDocumentLoader {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl DocumentLoader for KvDocumentLoader {
    async fn load_documents(
        &self,
        pointers: &HeadsMap,
        chunk_size: usize,
    ) -> docindex_indexer::Result<Box<dyn SnapshotStream>> {
        Ok(Box::new(KvSnapshotStream {
            kv: self.kv.clone(),
            remaining: pointers.keys().cloned().collect(),
            chunk_size: chunk_size.max(1),
        }))
    }
}

struct KvSnapshotStream {
    kv: Arc<dyn KvStore>,
    remaining: VecDeque<ObjectPointer>,
    chunk_size: usize,
}

#[async_trait]
impl SnapshotStream for KvSnapshotStream {
    async fn next_batch(&mut self) -> docindex_indexer::Result<Option<Vec<ObjectSnapshot>>> {
        while !self.remaining.is_empty() {
            let take = self.chunk_size.min(self.remaining.len());
            let mut batch = Vec::with_capacity(take);
            for pointer in self.remaining.drain(..take).collect::<Vec<_>>() {
                let Some(raw) = self.kv.get(&document_key(&pointer)).await? else {
                    continue;
                };
                match serde_json::from_slice::<DocumentRecord>(&raw) {
                    Ok(record) => batch.push(ObjectSnapshot::new(pointer, record.object, record.heads)),
                    Err(err) => log::warn!("Skipping unreadable document {pointer}: {err}"),
                }
            }
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }
}
