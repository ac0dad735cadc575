//! Post-processing of raw pipeline output into records keyed by logical names.

use crate::errors::DsError;
use crate::pipeline::RECORD_DOES_NOT_EXIST;
use crate::query::Projection;
use crate::relation::{CollectionDef, RelationGraph};
use crate::utils::docpath::get_path;
use crate::utils::paths::physical_name;
use bson::{Bson, Document};

/// Turns native documents into records of one collection.
///
/// - a root record carrying the does-not-exist marker is dropped, a marked relation payload
///   becomes null;
/// - every projected column or relation missing from a document is set to null, recursing
///   only into projected relations.
///
/// An empty projection stands for every column of the collection.
#[derive(Debug, Clone, Copy)]
pub struct RecordShaper<'g> {
    graph: &'g RelationGraph,
    collection: &'g CollectionDef,
}

impl<'g> RecordShaper<'g> {
    #[must_use]
    pub const fn new(graph: &'g RelationGraph, collection: &'g CollectionDef) -> Self {
        Self { graph, collection }
    }

    /// # Errors
    /// Fails when the projection names a relation unknown to the graph.
    pub fn shape(&self, records: Vec<Document>, projection: &Projection) -> Result<Vec<Document>, DsError> {
        let projection = self.effective(projection);
        records
            .into_iter()
            .filter(|r| !is_marked(r))
            .map(|r| shape_record(self.graph, self.collection, &r, &projection))
            .collect()
    }

    fn effective(&self, projection: &Projection) -> Projection {
        if projection.is_empty() {
            Projection::new(self.collection.schema.columns.keys().cloned())
        } else {
            projection.clone()
        }
    }
}

fn is_marked(doc: &Document) -> bool {
    matches!(doc.get(RECORD_DOES_NOT_EXIST), Some(Bson::Boolean(true)))
}

fn shape_record(
    graph: &RelationGraph,
    collection: &CollectionDef,
    doc: &Document,
    projection: &Projection,
) -> Result<Document, DsError> {
    let mut out = Document::new();
    for column in projection.columns() {
        let value = get_path(doc, &physical_name(column)).cloned().unwrap_or(Bson::Null);
        out.insert(column, value);
    }
    for (name, sub) in projection.relations() {
        let relation = collection.relation(&name).ok_or_else(|| DsError::NoSuchField(name.clone()))?;
        let target = graph.collection(relation.foreign_collection())?;
        let value = match doc.get(&name) {
            Some(Bson::Document(payload)) if !is_marked(payload) => {
                Bson::Document(shape_record(graph, target, payload, &sub)?)
            }
            _ => Bson::Null,
        };
        out.insert(name, value);
    }
    Ok(out)
}
