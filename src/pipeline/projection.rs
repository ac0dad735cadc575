use crate::errors::DsError;
use crate::pipeline::filter::Coercions;
use crate::pipeline::joints::locate;
use crate::pipeline::stage::{PipelineStage, RECORD_DOES_NOT_EXIST, VERSION_FIELD};
use crate::query::{Projection, SortClause};
use crate::relation::{CollectionDef, Relation, RelationGraph};
use crate::schema::ID_FIELD;
use crate::utils::paths::{join, physical_name};
use bson::Document;

/// `$sort` on the physical position of each clause, or nothing for an empty sort.
///
/// # Errors
/// Fails when a sort field does not resolve.
pub fn sort(
    graph: &RelationGraph,
    collection: &CollectionDef,
    clauses: &[SortClause],
) -> Result<Option<PipelineStage>, DsError> {
    if clauses.is_empty() {
        return Ok(None);
    }
    let mut spec = Document::new();
    for clause in clauses {
        let resolved = graph.resolve(collection, &clause.field)?;
        spec.insert(locate(&resolved), if clause.ascending { 1 } else { -1 });
    }
    Ok(Some(PipelineStage::Sort(spec)))
}

/// Terminal `$project` of a `list` request.
///
/// An empty projection hides the version key and coerced fields; otherwise only the
/// requested columns (and does-not-exist markers) are kept.
///
/// # Errors
/// Fails when a column or relation does not exist.
pub fn project(
    graph: &RelationGraph,
    collection: &CollectionDef,
    projection: &Projection,
    coercions: &Coercions,
) -> Result<PipelineStage, DsError> {
    let mut spec = Document::new();
    if projection.is_empty() {
        spec.insert(VERSION_FIELD, 0);
        for name in coercions.values() {
            spec.insert(name.clone(), 0);
        }
        return Ok(PipelineStage::Project(spec));
    }

    if !projection.columns().any(|c| c == ID_FIELD) {
        spec.insert(ID_FIELD, 0);
    }
    if collection.is_virtual() {
        spec.insert(RECORD_DOES_NOT_EXIST, 1);
    }
    include(graph, collection, projection, None, &mut spec)?;
    Ok(PipelineStage::Project(spec))
}

fn include(
    graph: &RelationGraph,
    collection: &CollectionDef,
    projection: &Projection,
    position: Option<&str>,
    spec: &mut Document,
) -> Result<(), DsError> {
    for column in projection.columns() {
        if collection.column(column).is_none() {
            return Err(DsError::NoSuchField(column.to_string()));
        }
        spec.insert(join(position, &physical_name(column)), 1);
    }
    for (name, sub) in projection.relations() {
        let relation = collection.relation(&name).ok_or_else(|| DsError::NoSuchField(name.clone()))?;
        let target = graph.collection(relation.foreign_collection())?;
        let next = join(position, &name);
        if matches!(relation, Relation::OneToOne { .. }) {
            spec.insert(join(Some(&next), RECORD_DOES_NOT_EXIST), 1);
        }
        include(graph, target, &sub, Some(&next), spec)?;
    }
    Ok(())
}
