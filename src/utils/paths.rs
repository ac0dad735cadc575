//! Field path helpers.
//!
//! Three separators coexist in this crate:
//! - `.` nests physical fields inside a stored document,
//! - `@@@` names a nested field that was flattened onto its parent,
//! - `:` traverses a relation in request paths (`storeId__manyToOne:name`).

pub const PHYSICAL_SEP: char = '.';
pub const FLATTEN_SEP: &str = "@@@";
pub const RELATION_SEP: char = ':';

/// Name under which a nested path is exposed once flattened.
#[must_use]
pub fn flatten_name(path: &str) -> String {
    path.replace(PHYSICAL_SEP, FLATTEN_SEP)
}

/// Physical path behind a (possibly flattened) column name.
#[must_use]
pub fn physical_name(name: &str) -> String {
    name.replace(FLATTEN_SEP, ".")
}

/// Joins an optional prefix and a path with the physical separator.
#[must_use]
pub fn join(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() && !path.is_empty() => format!("{p}.{path}"),
        Some(p) if !p.is_empty() => p.to_string(),
        _ => path.to_string(),
    }
}

/// Returns `path` relative to `prefix` when `path` lives strictly below it.
#[must_use]
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix(PHYSICAL_SEP))
}

/// True when `path` equals `ancestor` or lives below it.
#[must_use]
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || strip_prefix(path, ancestor).is_some()
}

/// Every strict ancestor of a dotted path, shortest first: `a.b.c` yields `a`, `a.b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices(PHYSICAL_SEP).map(move |(i, _)| &path[..i])
}

/// Number of physical segments in a path (`None` is the root, depth 0).
#[must_use]
pub fn depth(path: Option<&str>) -> usize {
    path.map_or(0, |p| p.split(PHYSICAL_SEP).count())
}

/// Reserved paths never surface in a schema: `$*` wildcards and
/// double-underscore bookkeeping fields such as the `__v` version key.
#[must_use]
pub fn is_reserved(path: &str) -> bool {
    path.contains("$*") || path.split(PHYSICAL_SEP).any(|s| s.starts_with("__"))
}

/// Splits a request path into its relation hops and the final column.
#[must_use]
pub fn split_relation_path(field: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = field.split(RELATION_SEP).collect();
    let column = parts.pop().unwrap_or_default();
    (parts, column)
}
