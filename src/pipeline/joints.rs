//! Relation discovery and the joins materializing it.

use crate::errors::DsError;
use crate::pipeline::reparent::{boxed, composite_id, or_missing};
use crate::pipeline::stage::{PipelineStage, field_ref};
use crate::relation::{CollectionDef, Relation, RelationGraph, ResolvedField};
use crate::schema::{ID_FIELD, PARENT_FIELD, PARENT_ID_FIELD};
use crate::utils::paths::{RELATION_SEP, join, physical_name};
use bson::{Bson, Document, doc};
use std::collections::BTreeSet;

/// Physical path of a resolved field in the pipeline document: relation positions first,
/// then the column's physical path.
#[must_use]
pub fn locate(resolved: &ResolvedField<'_>) -> String {
    let position = position_of(resolved.hops.iter().map(|h| h.name));
    join(position.as_deref(), &physical_name(resolved.column))
}

fn position_of<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let names: Vec<&str> = names.collect();
    (!names.is_empty()).then(|| names.join("."))
}

fn is_relation_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(RELATION_SEP))
}

/// Adds a joint to the set, keeping it minimal: a longer path supersedes its prefixes, and
/// a prefix of an already planned path adds nothing.
#[must_use]
pub fn add_joint(mut joints: Vec<String>, joint: String) -> Vec<String> {
    if joints.iter().any(|j| *j == joint || is_relation_prefix(&joint, j)) {
        return joints;
    }
    joints.retain(|j| !is_relation_prefix(j, &joint));
    joints.push(joint);
    joints
}

/// Minimal joints needed by a set of resolved fields, in discovery order.
#[must_use]
pub fn discover<'a, 'g: 'a>(fields: impl IntoIterator<Item = &'a ResolvedField<'g>>) -> Vec<String> {
    fields.into_iter().filter_map(ResolvedField::joint).fold(Vec::new(), add_joint)
}

/// Join stages for every joint. Shared prefixes are joined once.
///
/// # Errors
/// Fails on a `parent` hop behind another hop, and on relations that cannot be embedded.
pub fn joins(
    graph: &RelationGraph,
    collection: &CollectionDef,
    joints: &[String],
) -> Result<Vec<PipelineStage>, DsError> {
    let mut stages = Vec::new();
    let mut emitted: BTreeSet<String> = BTreeSet::new();
    for joint in joints {
        let mut position: Option<String> = None;
        let mut current = collection;
        for (depth, name) in joint.split(RELATION_SEP).enumerate() {
            let relation = current.relation(name).ok_or_else(|| DsError::NoSuchField(joint.clone()))?;
            let target = graph.collection(relation.foreign_collection())?;
            let is_parent_link = name == PARENT_FIELD && current.is_virtual();
            if is_parent_link && depth > 0 {
                return Err(DsError::NestedParentLink(joint.clone()));
            }
            let next = join(position.as_deref(), name);
            if !is_parent_link && emitted.insert(next.clone()) {
                stages.extend(join_stages(joint, name, relation, position.as_deref(), &next, target)?);
            }
            position = Some(next);
            current = target;
        }
    }
    Ok(stages)
}

fn join_stages(
    joint: &str,
    name: &str,
    relation: &Relation,
    position: Option<&str>,
    next: &str,
    target: &CollectionDef,
) -> Result<Vec<PipelineStage>, DsError> {
    match relation {
        Relation::ManyToOne { foreign_key, .. } => Ok(vec![
            PipelineStage::lookup(&target.model, &join(position, &physical_name(foreign_key)), next),
            PipelineStage::unwind(next, true),
        ]),
        Relation::OneToOne { .. } => {
            let relative = target
                .boundaries
                .last()
                .map(|b| b.relative.as_str())
                .ok_or_else(|| DsError::NoSuchCollection(target.name.clone()))?;
            let payload = join(position, relative);
            let parent_id = join(position, ID_FIELD);
            let mut identity = Document::new();
            identity.insert(ID_FIELD, composite_id(&parent_id, relative, false));
            identity.insert(PARENT_ID_FIELD, field_ref(&parent_id));
            let merged: Bson =
                doc! { "$mergeObjects": [boxed(field_ref(&payload), target.is_leaf), identity] }.into();
            let mut fields = Document::new();
            fields.insert(next, or_missing(&payload, merged));
            Ok(vec![PipelineStage::AddFields(fields)])
        }
        Relation::OneToMany { .. } | Relation::ManyToMany { .. } => Err(DsError::UnsupportedRelation {
            field: joint.to_string(),
            relation: name.to_string(),
            kind: relation.kind(),
        }),
    }
}
