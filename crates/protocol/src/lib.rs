//! # docindex protocol
//!
//! Identity, version and query types shared by every docindex crate.
//!
//! - [`ObjectPointer`] names an object inside a versioned document
//! - [`Heads`] is the version vector an object was observed at
//! - [`ObjectSnapshot`] pairs both with the object content
//! - [`IndexKind`] identifies an index configuration
//! - [`IndexQuery`] / [`FindResult`] are the `find` contract

mod heads;
mod kind;
mod object;
mod pointer;
mod query;

pub use heads::Heads;
pub use kind::IndexKind;
pub use object::{
    as_reference, reference, IndexedObject, ObjectSnapshot, RelationEndpoints, REFERENCE_KEY,
};
pub use pointer::ObjectPointer;
pub use query::{FindResult, GraphQuery, GraphQueryKind, IndexQuery, TextQuery, TextQueryKind};
