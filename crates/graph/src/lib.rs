//! # docindex graph
//!
//! Adjacency over structural references between objects.
//!
//! ```text
//! IndexedObject
//!     │
//!     ├──> collect_references (data walk, `{"/": pointer}` values)
//!     │      └─ (property path, target)
//!     │
//!     └──> ReferenceGraph
//!            ├─ inboundReferences: target -> path -> sources
//!            ├─ relationSources:   endpoint -> relations
//!            └─ relationTargets:   endpoint -> relations
//! ```

mod adjacency;
mod error;
mod references;

pub use adjacency::{AdjacencyMaps, PointerSet, ReferenceGraph};
pub use error::{GraphError, Result};
pub use references::{collect_references, ObjectEdges, Reference};
