use crate::errors::DsError;
use crate::pipeline::VERSION_FIELD;
use crate::store::eval::{bson_eq, matches};
use crate::store::stage::{self, Collections};
use crate::store::update::apply_update;
use crate::store::{DeleteReport, NativeStore, UpdateReport};
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::future::Future;
use std::time::Instant;

/// In-memory document store evaluating native pipelines.
///
/// Reads take a shared lock over every collection so `$lookup` sees a consistent snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::seed`].
    #[must_use]
    pub fn with_collection(self, name: &str, documents: Vec<Document>) -> Self {
        self.seed(name, documents);
        self
    }

    /// Appends documents as they are, without id assignment.
    pub fn seed(&self, name: &str, documents: Vec<Document>) {
        self.collections.write().entry(name.to_string()).or_default().extend(documents);
    }

    /// Snapshot of a collection.
    #[must_use]
    pub fn documents(&self, name: &str) -> Vec<Document> {
        self.collections.read().get(name).cloned().unwrap_or_default()
    }

    /// Synchronous pipeline evaluation.
    ///
    /// # Errors
    /// Fails on malformed or unsupported stages.
    pub fn run(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, DsError> {
        let bench_start = Instant::now();
        let data = self.collections.read();
        let docs = data.get(collection).cloned().unwrap_or_default();
        let out = stage::run(docs, pipeline, &data)?;
        crate::dev6!(
            "{{\"bench\":\"store\",\"op\":\"aggregate\",\"collection\":\"{}\",\"duration_ms\":{},\"stages\":{},\"returned\":{}}}",
            collection,
            bench_start.elapsed().as_millis(),
            pipeline.len(),
            out.len()
        );
        Ok(out)
    }

    fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>, DsError> {
        let mut data = self.collections.write();
        let docs = data.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(documents.len());
        for mut doc in documents {
            let id = match doc.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    doc.insert("_id", id.clone());
                    id
                }
            };
            if docs.iter().any(|d| d.get("_id").is_some_and(|existing| bson_eq(existing, &id))) {
                return Err(DsError::Store(format!("duplicate key in '{collection}': {id}")));
            }
            doc.insert(VERSION_FIELD, 0);
            docs.push(doc);
            ids.push(id);
        }
        log::debug!("inserted {} document(s) into '{collection}'", ids.len());
        Ok(ids)
    }

    fn update(&self, collection: &str, filter: &Document, update: &Document) -> Result<UpdateReport, DsError> {
        let bench_start = Instant::now();
        let mut data = self.collections.write();
        let mut report = UpdateReport::default();
        if let Some(docs) = data.get_mut(collection) {
            for doc in docs.iter_mut() {
                if !matches(doc, filter)? {
                    continue;
                }
                report.matched += 1;
                if apply_update(doc, update)? {
                    report.modified += 1;
                }
            }
        }
        crate::dev6!(
            "{{\"bench\":\"store\",\"op\":\"update_many\",\"collection\":\"{}\",\"duration_ms\":{},\"matched\":{},\"modified\":{}}}",
            collection,
            bench_start.elapsed().as_millis(),
            report.matched,
            report.modified
        );
        Ok(report)
    }

    fn delete(&self, collection: &str, filter: &Document) -> Result<DeleteReport, DsError> {
        let mut data = self.collections.write();
        let Some(docs) = data.get_mut(collection) else {
            return Ok(DeleteReport::default());
        };
        let doomed = docs.iter().map(|d| matches(d, filter)).collect::<Result<Vec<bool>, _>>()?;
        let before = docs.len();
        let mut flags = doomed.into_iter();
        docs.retain(|_| !flags.next().unwrap_or(false));
        let deleted = u64::try_from(before - docs.len()).unwrap_or(u64::MAX);
        crate::dev6!(
            "{{\"bench\":\"store\",\"op\":\"delete_many\",\"collection\":\"{}\",\"deleted\":{}}}",
            collection,
            deleted
        );
        Ok(DeleteReport { deleted })
    }
}

impl NativeStore for MemoryStore {
    fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Document>, DsError>> + Send {
        async move { self.run(collection, &pipeline) }
    }

    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> impl Future<Output = Result<Vec<Bson>, DsError>> + Send {
        async move { self.insert(collection, documents) }
    }

    fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> impl Future<Output = Result<UpdateReport, DsError>> + Send {
        async move { self.update(collection, &filter, &update) }
    }

    fn delete_many(
        &self,
        collection: &str,
        filter: Document,
    ) -> impl Future<Output = Result<DeleteReport, DsError>> + Send {
        async move { self.delete(collection, &filter) }
    }
}
