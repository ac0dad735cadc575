//! Re-roots the physical record stream onto a promoted path.

use crate::pipeline::stage::{INDEX_FIELD, PipelineStage, RECORD_DOES_NOT_EXIST, field_ref};
use crate::relation::{Boundary, CollectionDef};
use crate::schema::{CONTENT_FIELD, ID_FIELD, PARENT_FIELD, PARENT_ID_FIELD};
use bson::{Bson, Document, doc};

/// Stages turning records of the model into records of `collection`, one boundary at a time.
///
/// Object boundaries tag parents without a value at the path; those records are dropped
/// right away so they never reach grouping or pagination.
#[must_use]
pub fn reparent(collection: &CollectionDef) -> Vec<PipelineStage> {
    boundary_stages(&collection.boundaries)
}

fn boundary_stages(boundaries: &[Boundary]) -> Vec<PipelineStage> {
    let mut stages = Vec::new();
    for boundary in boundaries {
        if boundary.is_array {
            stages.push(PipelineStage::unwind_with_index(&boundary.relative));
        }
        stages.push(PipelineStage::ReplaceRoot(doc! { "newRoot": new_root(boundary) }));
        if !boundary.is_array {
            stages.push(PipelineStage::Match(existing_only()));
        }
    }
    stages
}

/// `{"__record_does_not_exist__": {"$ne": true}}`
#[must_use]
pub fn existing_only() -> Document {
    let mut filter = Document::new();
    filter.insert(RECORD_DOES_NOT_EXIST, doc! { "$ne": true });
    filter
}

/// `{"__record_does_not_exist__": true}`
#[must_use]
pub fn missing_tag() -> Document {
    let mut tag = Document::new();
    tag.insert(RECORD_DOES_NOT_EXIST, true);
    tag
}

/// Composite id of a nested record: parent id, relative path, element index when unwound.
#[must_use]
pub fn composite_id(parent_id: &str, relative: &str, indexed: bool) -> Bson {
    let mut parts = vec![
        Bson::Document(doc! { "$toString": field_ref(parent_id) }),
        Bson::String(format!(".{relative}")),
    ];
    if indexed {
        parts.push(Bson::String(".".into()));
        parts.push(Bson::Document(doc! { "$toString": field_ref(INDEX_FIELD) }));
    }
    doc! { "$concat": parts }.into()
}

/// Boxes a leaf under `content`.
#[must_use]
pub fn boxed(value: Bson, is_leaf: bool) -> Bson {
    if !is_leaf {
        return value;
    }
    let mut wrapper = Document::new();
    wrapper.insert(CONTENT_FIELD, value);
    Bson::Document(wrapper)
}

/// Null or absent source value becomes the does-not-exist tag.
#[must_use]
pub fn or_missing(path: &str, present: Bson) -> Bson {
    doc! {
        "$cond": [
            { "$in": [ { "$type": field_ref(path) }, ["missing", "null"] ] },
            missing_tag(),
            present,
        ]
    }
    .into()
}

fn new_root(boundary: &Boundary) -> Bson {
    let value = field_ref(&boundary.relative);
    let payload = if boundary.is_array {
        boxed(value, boundary.is_leaf)
    } else {
        or_missing(&boundary.relative, boxed(value, boundary.is_leaf))
    };
    let mut identity = Document::new();
    identity.insert(ID_FIELD, composite_id(ID_FIELD, &boundary.relative, boundary.is_array));
    identity.insert(PARENT_ID_FIELD, field_ref(ID_FIELD));
    identity.insert(PARENT_FIELD, "$$ROOT");
    doc! { "$mergeObjects": [payload, identity] }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(relative: &str, is_array: bool, is_leaf: bool) -> Boundary {
        Boundary { path: relative.into(), relative: relative.into(), is_array, is_leaf }
    }

    #[test]
    fn array_boundary_unwinds_before_replacing_root() {
        let b = boundary("stores", true, false);
        let root = new_root(&b);
        let merged = root.as_document().unwrap().get_array("$mergeObjects").unwrap();
        assert_eq!(merged[0], Bson::String("$stores".into()));
        let identity = merged[1].as_document().unwrap();
        assert_eq!(identity.get_str(PARENT_ID_FIELD).unwrap(), "$_id");
        assert_eq!(identity.get_str(PARENT_FIELD).unwrap(), "$$ROOT");
        let concat = identity.get_document(ID_FIELD).unwrap().get_array("$concat").unwrap();
        assert_eq!(concat.len(), 4);
    }

    #[test]
    fn object_boundary_tags_missing_values() {
        let b = boundary("engine", false, false);
        let root = new_root(&b);
        let merged = root.as_document().unwrap().get_array("$mergeObjects").unwrap();
        assert!(merged[0].as_document().unwrap().contains_key("$cond"));
    }

    #[test]
    fn only_object_boundaries_drop_missing_records() {
        let stages = boundary_stages(&[boundary("engine", false, false), boundary("parts", true, false)]);
        let ops: Vec<_> = stages.iter().map(PipelineStage::operator).collect();
        assert_eq!(ops, vec!["$replaceRoot", "$match", "$unwind", "$replaceRoot"]);
        assert_eq!(stages[1], PipelineStage::Match(existing_only()));
    }

    #[test]
    fn leaf_boundary_is_boxed() {
        let b = boundary("tags", true, true);
        let root = new_root(&b);
        let merged = root.as_document().unwrap().get_array("$mergeObjects").unwrap();
        assert_eq!(merged[0].as_document().unwrap().get_str(CONTENT_FIELD).unwrap(), "$tags");
    }
}
