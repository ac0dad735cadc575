//! Relational view over document-store models.
//!
//! Nested subdocuments and arrays of a model are promoted into virtual collections or
//! flattened into columns; relations between collections are synthesized in both
//! directions; relational requests compile into native aggregation pipelines whose output
//! is shaped back into records.

pub mod cli;
pub mod collection;
pub mod composite_id;
pub mod config;
pub mod datasource;
pub mod errors;
pub mod logger;
pub mod pipeline;
pub mod query;
pub mod relation;
pub mod schema;
pub mod shaper;
pub mod store;
pub mod utils;
pub mod virtualization;

pub use collection::Collection;
pub use config::{DatasourceOptions, FlattenMode};
pub use datasource::Datasource;
pub use errors::DsError;
pub use pipeline::PipelineCompiler;
pub use relation::RelationGraph;
pub use schema::{NativeField, NativeModel, NativeSchema, NativeType};
pub use store::{MemoryStore, NativeStore};
