//! # docindex search
//!
//! Text side of the index kinds:
//!
//! ```text
//! object data
//!     │
//!     ├──> extract_text_blocks (string leaves, references skipped)
//!     │
//!     ├──> break_into_chunks (sentence packing, bounded size)
//!     │
//!     └──> TextSearch (BM25 by default)
//! ```

mod bm25;
mod chunking;
mod error;
mod extract;

pub use bm25::{Bm25Index, TextSearch};
pub use chunking::{break_into_chunks, DEFAULT_CHUNK_SIZE};
pub use error::{Result, SearchError};
pub use extract::extract_text_blocks;
