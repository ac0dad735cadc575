use crate::errors::DsError;
use crate::store::eval::bson_eq;
use crate::utils::docpath::{get_path, set_path, unset_path};
use bson::{Bson, Document};

/// Applies a native update document (`$set`, `$unset`, `$push`, `$pull`) in place.
/// Returns whether the record changed.
///
/// # Errors
/// Fails on unknown operators, on `$push` to a non-array and on paths that cannot be set.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<bool, DsError> {
    let mut changed = false;
    for (op, fields) in update {
        let fields = fields.as_document().ok_or_else(|| DsError::Store(format!("{op} takes an object")))?;
        for (path, value) in fields {
            changed |= match op.as_str() {
                "$set" => {
                    let before = get_path(doc, path).cloned();
                    if !set_path(doc, path, value.clone()) {
                        return Err(DsError::Store(format!("cannot set '{path}'")));
                    }
                    before.as_ref() != Some(value)
                }
                "$unset" => unset_path(doc, path),
                "$push" => push(doc, path, value.clone())?,
                "$pull" => pull(doc, path, value),
                other => return Err(DsError::Store(format!("unsupported update operator {other}"))),
            };
        }
    }
    Ok(changed)
}

fn push(doc: &mut Document, path: &str, value: Bson) -> Result<bool, DsError> {
    let mut items = match get_path(doc, path) {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(other) => return Err(DsError::Store(format!("cannot $push to non-array '{path}': {other}"))),
    };
    items.push(value);
    if !set_path(doc, path, Bson::Array(items)) {
        return Err(DsError::Store(format!("cannot set '{path}'")));
    }
    Ok(true)
}

fn pull(doc: &mut Document, path: &str, value: &Bson) -> bool {
    let Some(Bson::Array(items)) = get_path(doc, path) else {
        return false;
    };
    let kept: Vec<Bson> = items.iter().filter(|i| !bson_eq(i, value)).cloned().collect();
    if kept.len() == items.len() {
        return false;
    }
    set_path(doc, path, Bson::Array(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_reports_changes_only() {
        let mut d = doc! { "a": 1 };
        assert!(!apply_update(&mut d, &doc! { "$set": { "a": 1 } }).unwrap());
        assert!(apply_update(&mut d, &doc! { "$set": { "b.c": 2 } }).unwrap());
        assert_eq!(d, doc! { "a": 1, "b": { "c": 2 } });
    }

    #[test]
    fn unset_then_pull_removes_an_element() {
        let mut d = doc! { "stores": [ { "n": "A" }, { "n": "B" }, { "n": "C" } ] };
        apply_update(&mut d, &doc! { "$unset": { "stores.1": "" } }).unwrap();
        apply_update(&mut d, &doc! { "$pull": { "stores": null } }).unwrap();
        assert_eq!(d, doc! { "stores": [ { "n": "A" }, { "n": "C" } ] });
    }

    #[test]
    fn push_creates_missing_arrays() {
        let mut d = doc! {};
        apply_update(&mut d, &doc! { "$push": { "tags": "x" } }).unwrap();
        assert_eq!(d, doc! { "tags": ["x"] });
        let err = apply_update(&mut d, &doc! { "$push": { "tags.0": 1 } });
        assert!(err.is_err());
    }
}
