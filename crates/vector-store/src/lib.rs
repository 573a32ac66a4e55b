//! # docindex vector store
//!
//! Embedding side of the vector index kind.
//!
//! ```text
//! chunks ──> Embedder (pluggable, open/close scoped)
//!               │
//!               └─> combine (mean | max | disabled) ──> unit vector
//!                                                        │
//!                                                        └─> VectorStore (cosine search)
//! ```

mod embedder;
mod error;
mod pooling;
mod store;

pub use embedder::{Embedder, HashingEmbedder};
pub use error::{Result, VectorStoreError};
pub use pooling::{combine, embed_chunks, ChunkCombination};
pub use store::{cosine_similarity, normalize, VectorStore};
