//! Dotted-path access into BSON documents.

use bson::{Bson, Document};

/// Safety limit on path depth.
pub const MAX_PATH_DEPTH: usize = 32;

/// Value at a dotted path. Numeric segments index into arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return None;
    }
    let mut segs = path.split('.');
    let first = segs.next()?;
    let mut cur = doc.get(first)?;
    for (depth, seg) in segs.enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Sets a dotted path, creating intermediate documents (and replacing non-document values
/// in the way). Numeric segments address existing array elements.
pub fn set_path(root: &mut Document, path: &str, value: Bson) -> bool {
    match path.split_once('.') {
        None => {
            root.insert(path, value);
            true
        }
        Some((head, rest)) => {
            if !matches!(root.get(head), Some(Bson::Document(_) | Bson::Array(_))) {
                root.insert(head, Document::new());
            }
            match root.get_mut(head) {
                Some(Bson::Document(d)) => set_path(d, rest, value),
                Some(Bson::Array(items)) => set_in_array(items, rest, value),
                _ => false,
            }
        }
    }
}

fn set_in_array(items: &mut [Bson], path: &str, value: Bson) -> bool {
    let (index, rest) = match path.split_once('.') {
        Some((i, r)) => (i, Some(r)),
        None => (path, None),
    };
    let Some(slot) = index.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
        return false;
    };
    match (rest, slot) {
        (None, slot) => {
            *slot = value;
            true
        }
        (Some(rest), Bson::Document(d)) => set_path(d, rest, value),
        (Some(rest), Bson::Array(inner)) => set_in_array(inner, rest, value),
        _ => false,
    }
}

/// Removes the value at a dotted path. An array element is replaced by null so sibling
/// indexes stay stable.
pub fn unset_path(root: &mut Document, path: &str) -> bool {
    match path.split_once('.') {
        None => root.remove(path).is_some(),
        Some((head, rest)) => match root.get_mut(head) {
            Some(Bson::Document(d)) => unset_path(d, rest),
            Some(Bson::Array(items)) => unset_in_array(items, rest),
            _ => false,
        },
    }
}

fn unset_in_array(items: &mut [Bson], path: &str) -> bool {
    let (index, rest) = match path.split_once('.') {
        Some((i, r)) => (i, Some(r)),
        None => (path, None),
    };
    let Some(slot) = index.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
        return false;
    };
    match (rest, slot) {
        (None, slot) => {
            *slot = Bson::Null;
            true
        }
        (Some(rest), Bson::Document(d)) => unset_path(d, rest),
        (Some(rest), Bson::Array(inner)) => unset_in_array(inner, rest),
        _ => false,
    }
}
