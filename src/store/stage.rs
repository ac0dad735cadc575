//! Evaluation of native pipeline stages over in-memory documents.

use crate::errors::DsError;
use crate::store::eval::{as_f64, bson_eq, compare_bson, matches, values_at};
use crate::store::expr::{eval, pick};
use crate::utils::docpath::{get_path, set_path, unset_path};
use bson::{Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Collections visible to `$lookup`.
pub type Collections = HashMap<String, Vec<Document>>;

/// Runs `pipeline` over `docs`.
///
/// # Errors
/// Fails on malformed or unsupported stages and expressions.
pub fn run(mut docs: Vec<Document>, pipeline: &[Document], data: &Collections) -> Result<Vec<Document>, DsError> {
    for stage in pipeline {
        let mut it = stage.iter();
        let (Some((op, spec)), None) = (it.next(), it.next()) else {
            return Err(DsError::Store(format!("a stage has exactly one operator: {stage}")));
        };
        docs = match op.as_str() {
            "$match" => {
                let filter = as_doc(op, spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for d in docs {
                    if matches(&d, filter)? {
                        kept.push(d);
                    }
                }
                kept
            }
            "$sort" => sort(docs, as_doc(op, spec)?),
            "$skip" => docs.into_iter().skip(count(op, spec)?).collect(),
            "$limit" => docs.into_iter().take(count(op, spec)?).collect(),
            "$project" => project(docs, as_doc(op, spec)?)?,
            "$addFields" | "$set" => add_fields(docs, as_doc(op, spec)?)?,
            "$replaceRoot" => replace_root(docs, as_doc(op, spec)?)?,
            "$unwind" => unwind(docs, spec)?,
            "$lookup" => lookup(docs, as_doc(op, spec)?, data)?,
            "$group" => group(docs, as_doc(op, spec)?)?,
            other => return Err(DsError::Store(format!("unsupported stage {other}"))),
        };
    }
    Ok(docs)
}

fn as_doc<'a>(op: &str, spec: &'a Bson) -> Result<&'a Document, DsError> {
    spec.as_document().ok_or_else(|| DsError::Store(format!("{op} takes an object")))
}

fn count(op: &str, spec: &Bson) -> Result<usize, DsError> {
    let n = match spec {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => return Err(DsError::Store(format!("{op} takes an integer"))),
    };
    usize::try_from(n).map_err(|_| DsError::Store(format!("{op} must be positive")))
}

fn sort(mut docs: Vec<Document>, keys: &Document) -> Vec<Document> {
    let keys: Vec<(&str, bool)> =
        keys.iter().map(|(k, v)| (k.as_str(), as_f64(v).is_none_or(|d| d >= 0.0))).collect();
    docs.sort_by(|a, b| {
        for (path, ascending) in &keys {
            let x = values_at(a, path).first().copied().cloned().unwrap_or(Bson::Null);
            let y = values_at(b, path).first().copied().cloned().unwrap_or(Bson::Null);
            let ord = compare_bson(&x, &y);
            if ord != Ordering::Equal {
                return if *ascending { ord } else { ord.reverse() };
            }
        }
        Ordering::Equal
    });
    docs
}

fn is_exclusion(v: &Bson) -> bool {
    matches!(v, Bson::Boolean(false)) || as_f64(v).is_some_and(|n| n == 0.0)
}

fn is_inclusion(v: &Bson) -> bool {
    matches!(v, Bson::Boolean(true)) || as_f64(v).is_some_and(|n| n != 0.0)
}

fn project(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DsError> {
    let inclusive = spec.iter().any(|(k, v)| k != "_id" && !is_exclusion(v));
    if !inclusive {
        return Ok(docs
            .into_iter()
            .map(|mut d| {
                for path in spec.keys() {
                    unset_deep(&mut d, path);
                }
                d
            })
            .collect());
    }
    let keep_id = spec.get("_id").is_none_or(|v| !is_exclusion(v));
    docs.into_iter()
        .map(|d| {
            let mut out = Document::new();
            if keep_id && !spec.contains_key("_id") {
                include_path(&d, &mut out, "_id");
            }
            for (path, v) in spec {
                if is_exclusion(v) {
                    continue;
                }
                if is_inclusion(v) {
                    include_path(&d, &mut out, path);
                } else if let Some(value) = eval(v, &d)? {
                    set_path(&mut out, path, value);
                }
            }
            Ok(out)
        })
        .collect()
}

fn include_path(src: &Document, out: &mut Document, path: &str) {
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    let Some(value) = src.get(head) else { return };
    match (rest, value) {
        (None, v) => {
            out.insert(head, v.clone());
        }
        (Some(rest), Bson::Document(sub)) => {
            let mut target = match out.get(head) {
                Some(Bson::Document(d)) => d.clone(),
                _ => Document::new(),
            };
            include_path(sub, &mut target, rest);
            out.insert(head, target);
        }
        (Some(rest), Bson::Array(items)) => {
            let existing = match out.get(head) {
                Some(Bson::Array(a)) => a.clone(),
                _ => Vec::new(),
            };
            let projected: Vec<Bson> = items
                .iter()
                .filter_map(Bson::as_document)
                .enumerate()
                .map(|(i, sub)| {
                    let mut target = match existing.get(i) {
                        Some(Bson::Document(d)) => d.clone(),
                        _ => Document::new(),
                    };
                    include_path(sub, &mut target, rest);
                    Bson::Document(target)
                })
                .collect();
            out.insert(head, projected);
        }
        (Some(_), _) => {}
    }
}

fn unset_deep(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(sub)) => unset_deep(sub, rest),
            Some(Bson::Array(items)) => {
                for item in items {
                    if let Bson::Document(sub) = item {
                        unset_deep(sub, rest);
                    }
                }
            }
            _ => {}
        },
    }
}

fn add_fields(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DsError> {
    docs.into_iter()
        .map(|d| {
            let mut out = d.clone();
            for (path, expr) in spec {
                if let Some(value) = eval(expr, &d)? {
                    set_path(&mut out, path, value);
                }
            }
            Ok(out)
        })
        .collect()
}

fn replace_root(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DsError> {
    let expr = spec.get("newRoot").ok_or_else(|| DsError::Store("$replaceRoot needs 'newRoot'".into()))?;
    docs.iter()
        .map(|d| match eval(expr, d)? {
            Some(Bson::Document(root)) => Ok(root),
            other => Err(DsError::Store(format!(
                "'newRoot' must evaluate to an object, got {}",
                other.map_or_else(|| "missing".to_string(), |v| v.to_string())
            ))),
        })
        .collect()
}

fn field_path(spec: &Bson) -> Result<&str, DsError> {
    spec.as_str()
        .and_then(|s| s.strip_prefix('$'))
        .ok_or_else(|| DsError::Store(format!("expected a '$field' path, got {spec}")))
}

fn unwind(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>, DsError> {
    let (path, index_field, preserve) = match spec {
        Bson::String(_) => (field_path(spec)?, None, false),
        Bson::Document(d) => (
            field_path(d.get("path").unwrap_or(&Bson::Null))?,
            d.get_str("includeArrayIndex").ok(),
            d.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => return Err(DsError::Store("$unwind takes a path or an object".into())),
    };
    let mut out = Vec::new();
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for (i, item) in items.into_iter().enumerate() {
                    let mut d = doc.clone();
                    set_path(&mut d, path, item);
                    if let Some(field) = index_field {
                        d.insert(field, i64::try_from(i).unwrap_or(i64::MAX));
                    }
                    out.push(d);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    let mut d = doc;
                    if matches!(get_path(&d, path), Some(Bson::Array(_))) {
                        unset_path(&mut d, path);
                    }
                    if let Some(field) = index_field {
                        d.insert(field, Bson::Null);
                    }
                    out.push(d);
                }
            }
            Some(_) => {
                let mut d = doc;
                if let Some(field) = index_field {
                    d.insert(field, Bson::Null);
                }
                out.push(d);
            }
        }
    }
    Ok(out)
}

fn lookup(docs: Vec<Document>, spec: &Document, data: &Collections) -> Result<Vec<Document>, DsError> {
    let text = |key: &str| spec.get_str(key).map_err(|_| DsError::Store(format!("$lookup needs '{key}'")));
    let (from, local, foreign, as_field) = (text("from")?, text("localField")?, text("foreignField")?, text("as")?);
    let sub_pipeline: Vec<Document> = match spec.get_array("pipeline") {
        Ok(stages) => stages.iter().filter_map(Bson::as_document).cloned().collect(),
        Err(_) => Vec::new(),
    };
    let foreign_docs = data.get(from).map_or(&[][..], Vec::as_slice);

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let keys = join_keys(&doc, local);
        let joined: Vec<Document> = foreign_docs
            .iter()
            .filter(|f| {
                let values = join_keys(f, foreign);
                keys.iter().any(|k| values.iter().any(|v| bson_eq(k, v)))
            })
            .cloned()
            .collect();
        let joined = run(joined, &sub_pipeline, data)?;
        set_path(&mut doc, as_field, Bson::Array(joined.into_iter().map(Bson::Document).collect()));
        out.push(doc);
    }
    Ok(out)
}

/// Values a join compares: array elements individually, a missing field as null.
fn join_keys(doc: &Document, path: &str) -> Vec<Bson> {
    let values = values_at(doc, path);
    if values.is_empty() {
        return vec![Bson::Null];
    }
    let mut out = Vec::new();
    for v in values {
        match v {
            Bson::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    out
}

enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool, is_long: bool },
    Avg { total: f64, n: u32 },
    Max(Option<Bson>),
    Min(Option<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, DsError> {
        Ok(match op {
            "$sum" => Self::Sum { int: 0, float: 0.0, is_float: false, is_long: false },
            "$avg" => Self::Avg { total: 0.0, n: 0 },
            "$max" => Self::Max(None),
            "$min" => Self::Min(None),
            other => return Err(DsError::Store(format!("unsupported accumulator {other}"))),
        })
    }

    fn push(&mut self, value: Option<Bson>) {
        let Some(value) = value else { return };
        match self {
            Self::Sum { int, float, is_float, is_long } => match value {
                Bson::Int32(i) => *int = int.saturating_add(i64::from(i)),
                Bson::Int64(i) => {
                    *int = int.saturating_add(i);
                    *is_long = true;
                }
                other => {
                    if let Some(f) = as_f64(&other) {
                        *float += f;
                        *is_float = true;
                    }
                }
            },
            Self::Avg { total, n } => {
                if let Some(f) = as_f64(&value) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Max(current) => *current = pick(current.take(), &value, true),
            Self::Min(current) => *current = pick(current.take(), &value, false),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum { int, float, is_float: true, .. } => Bson::Double(float + int as f64),
            Self::Sum { int, is_long: false, .. } => i32::try_from(int).map_or(Bson::Int64(int), Bson::Int32),
            Self::Sum { int, .. } => Bson::Int64(int),
            Self::Avg { n: 0, .. } => Bson::Null,
            Self::Avg { total, n } => Bson::Double(total / f64::from(n)),
            Self::Max(v) | Self::Min(v) => v.unwrap_or(Bson::Null),
        }
    }
}

fn group(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, DsError> {
    let id_expr = spec.get("_id").unwrap_or(&Bson::Null);
    let mut fields = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let acc = as_doc(name, acc)?;
        let (op, expr) = acc.iter().next().ok_or_else(|| DsError::Store(format!("empty accumulator for {name}")))?;
        fields.push((name.clone(), op.clone(), expr));
    }

    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();
    for doc in &docs {
        let key = eval(id_expr, doc)?.unwrap_or(Bson::Null);
        let slot = match groups.iter().position(|(k, _)| bson_eq(k, &key)) {
            Some(i) => i,
            None => {
                let accs = fields.iter().map(|(_, op, _)| Accumulator::new(op)).collect::<Result<_, _>>()?;
                groups.push((key, accs));
                groups.len() - 1
            }
        };
        for ((_, _, expr), acc) in fields.iter().zip(groups[slot].1.iter_mut()) {
            acc.push(eval(expr, doc)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((name, _, _), acc) in fields.iter().zip(accs) {
                out.insert(name.clone(), acc.finish());
            }
            out
        })
        .collect())
}
