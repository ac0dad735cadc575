//! Identifiers of virtual records: `{rootId}.{path}[.{index}]...`.
//!
//! The first segment is the physical record id (an object id when it is 24 hex digits);
//! the rest is the physical path of the nested value, array indexes included.
//!
//! Only object ids and strings without `.` survive the round trip. Other roots (numbers,
//! dotted strings, strings that read as an object id) are refused by [`build`].

use crate::errors::DsError;
use bson::Bson;
use bson::oid::ObjectId;

/// A composite id split back into its physical parts.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeId {
    pub root_id: Bson,
    /// Physical path below the root record, e.g. `stores.1.items.0`.
    pub path: String,
}

impl CompositeId {
    /// Index of the innermost array element, if the id addresses one.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.path.rsplit('.').next().and_then(|s| s.parse().ok())
    }

    /// Path of the container holding the addressed value.
    #[must_use]
    pub fn container_path(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(head, _)| head)
    }
}

/// Text of a root id that [`split`] reads back as the same value.
///
/// # Errors
/// Returns `InvalidId` for roots that would come back different.
pub fn root_text(root_id: &Bson) -> Result<String, DsError> {
    match root_id {
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        Bson::String(s) if !s.is_empty() && !s.contains('.') && ObjectId::parse_str(s).is_err() => Ok(s.clone()),
        other => Err(DsError::InvalidId(format!("root id {other} cannot be part of a composite id"))),
    }
}

/// Builds the id of the value at `path` (indexes included) below the record `root_id`.
///
/// # Errors
/// Returns `InvalidId` when `root_id` is not accepted by [`root_text`].
pub fn build(root_id: &Bson, path: &str) -> Result<String, DsError> {
    Ok(format!("{}.{path}", root_text(root_id)?))
}

/// Splits a composite id at its first `.`.
///
/// # Errors
/// Returns `InvalidId` when the id has no path part.
pub fn split(id: &str) -> Result<CompositeId, DsError> {
    let (root, path) = id
        .split_once('.')
        .filter(|(r, p)| !r.is_empty() && !p.is_empty())
        .ok_or_else(|| DsError::InvalidId(id.to_string()))?;
    let root_id = ObjectId::parse_str(root).map_or_else(|_| Bson::String(root.to_string()), Bson::ObjectId);
    Ok(CompositeId { root_id, path: path.to_string() })
}
