//! Relation graph: physical and virtual collections with their bidirectional relations.

pub mod graph;
pub mod synthesizer;
pub mod types;

pub use graph::{Hop, RelationGraph, ResolvedField};
pub use synthesizer::{MANY_TO_MANY_SUFFIX, MANY_TO_ONE_SUFFIX, ONE_TO_MANY_SUFFIX};
pub use types::{Boundary, CollectionDef, CollectionSchema, ColumnSchema, ColumnType, Relation};
