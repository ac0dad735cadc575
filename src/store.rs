//! Native store boundary: the only asynchronous seam of the crate.

pub mod eval;
pub mod expr;
pub mod memory;
pub mod stage;
pub mod update;

pub use memory::MemoryStore;

use crate::errors::DsError;
use bson::{Bson, Document};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteReport {
    pub deleted: u64,
}

/// A document store able to run native pipelines and filtered writes.
///
/// Collections are addressed by model name. Filters and updates are native documents.
pub trait NativeStore: Send + Sync {
    /// Runs a pipeline over the documents of `collection`.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Document>, DsError>> + Send;

    /// Inserts documents, assigning an object id to those without `_id`. Returns the ids.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Bson>, DsError>> + Send;

    fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> impl Future<Output = Result<UpdateReport, DsError>> + Send;

    fn delete_many(
        &self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<DeleteReport, DsError>> + Send;
}
