//! # docindex indexer
//!
//! Keeps a set of search indexes consistent with a versioned document store.
//!
//! ## Pipeline
//!
//! ```text
//! host save ──> CommitHook (mark dirty in the same batch)
//!                   │
//!                   └─> IndexScheduler (debounced)
//!                          │
//!                          ├──> promote_new_indexes (backfill from clean set)
//!                          │
//!                          └──> index_updated_objects (budgeted, batched)
//!                                  ├─> DocumentLoader
//!                                  ├─> Index kinds
//!                                  ├─> IndexSnapshotStore
//!                                  └─> mark_clean
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docindex_indexer::{
//!     IndexMetadataStore, IndexRegistry, IndexSnapshotStore, IndexingEngine,
//!     MemoryDocumentLoader, MemoryKvStore,
//! };
//! use docindex_protocol::{IndexKind, IndexQuery};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> docindex_indexer::Result<()> {
//!     let kv = Arc::new(MemoryKvStore::new());
//!     let metadata = Arc::new(IndexMetadataStore::new(kv.clone()));
//!     let snapshots = Arc::new(IndexSnapshotStore::new(kv, Arc::new(IndexRegistry::default())));
//!     let loader = Arc::new(MemoryDocumentLoader::new());
//!
//!     let engine = IndexingEngine::new(metadata, snapshots, loader);
//!     engine.reconcile(&[IndexKind::SchemaMatch, IndexKind::FullText]).await?;
//!     engine.promote_new_indexes().await?;
//!     engine.index_updated_objects(Duration::from_millis(100), 64).await?;
//!
//!     let hits = engine.find(&IndexKind::FullText, &IndexQuery::text("seals")).await?;
//!     println!("{} hits", hits.len());
//!     engine.close().await
//! }
//! ```

mod config;
mod engine;
mod error;
mod ids;
mod index;
mod loader;
mod metadata;
mod registry;
mod scheduler;
mod snapshot;
mod storage;

pub use config::{EngineConfig, SchedulerConfig, CONFIG_FILE_NAME};
pub use engine::{
    routes_to, IndexingEngine, IndexingOutcome, IndexingUpdate, SharedIndex,
    DEFAULT_LOAD_CHUNK_SIZE,
};
pub use error::{IndexerError, Result};
pub use ids::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use index::{
    FieldMatchIndex, FullTextIndex, GraphIndex, Index, SchemaMatchIndex, VectorConfig,
    VectorIndex, UNTYPED,
};
pub use loader::{DocumentLoader, MemoryDocumentLoader, SnapshotStream};
pub use metadata::{
    decode_heads, encode_heads, CommitHook, HeadsMap, IndexMetadataStore, MetadataEvent,
    CLEAN_PREFIX, DIRTY_PREFIX,
};
pub use registry::{EmbedderFactory, IndexRegistry};
pub use scheduler::IndexScheduler;
pub use snapshot::{
    decode_record, encode_record, IndexSnapshotStore, SnapshotHeader, SNAPSHOT_FORMAT_VERSION,
    SNAPSHOT_PREFIX,
};
pub use storage::{BatchOp, FsKvStore, KvStore, MemoryKvStore, WriteBatch};
