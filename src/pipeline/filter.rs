//! Condition tree lowering: string coercions, value casting and the `$match` document.

use crate::errors::DsError;
use crate::pipeline::joints::locate;
use crate::pipeline::stage::{STRING_PREFIX, field_ref};
use crate::query::{Aggregator, ConditionTree, Operator};
use crate::relation::{CollectionDef, RelationGraph};
use crate::schema::NativeType;
use crate::utils::paths::flatten_name;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use chrono::{DateTime, NaiveDate};
use std::collections::BTreeMap;

/// Physical path to the stringified field standing in for it.
pub type Coercions = BTreeMap<String, String>;

/// Plans a stringified copy of every non-string field a string operator targets.
///
/// # Errors
/// Fails when a leaf field does not resolve.
pub fn plan_coercions(
    graph: &RelationGraph,
    collection: &CollectionDef,
    tree: Option<&ConditionTree>,
) -> Result<Coercions, DsError> {
    let mut coercions = Coercions::new();
    let Some(tree) = tree else { return Ok(coercions) };
    collect_coercions(graph, collection, tree, &mut coercions)?;
    Ok(coercions)
}

fn collect_coercions(
    graph: &RelationGraph,
    collection: &CollectionDef,
    tree: &ConditionTree,
    out: &mut Coercions,
) -> Result<(), DsError> {
    match tree {
        ConditionTree::Branch { conditions, .. } => {
            for c in conditions {
                collect_coercions(graph, collection, c, out)?;
            }
        }
        ConditionTree::Leaf { field, operator, .. } if operator.is_string_only() => {
            let resolved = graph.resolve(collection, field)?;
            if !resolved.collection.native_type(resolved.column).is_string() {
                let path = locate(&resolved);
                let name = format!("{STRING_PREFIX}{}", flatten_name(&path));
                out.insert(path, name);
            }
        }
        ConditionTree::Leaf { .. } => {}
    }
    Ok(())
}

/// `$addFields` map computing the planned coercions.
#[must_use]
pub fn coercion_fields(coercions: &Coercions) -> Document {
    let mut fields = Document::new();
    for (path, name) in coercions {
        fields.insert(name.clone(), doc! { "$toString": field_ref(path) });
    }
    fields
}

/// Lowers a condition tree into a `$match` document.
///
/// # Errors
/// Fails on an unsupported operator or a field that does not resolve.
pub fn lower(
    graph: &RelationGraph,
    collection: &CollectionDef,
    tree: &ConditionTree,
    coercions: &Coercions,
) -> Result<Document, DsError> {
    match tree {
        ConditionTree::Branch { aggregator, conditions } => {
            let mut parts = conditions
                .iter()
                .map(|c| lower(graph, collection, c, coercions))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match (aggregator, parts.len()) {
                (Aggregator::And, 0) => Document::new(),
                (Aggregator::Or, 0) => doc! { "$nor": [ {} ] },
                (_, 1) => parts.remove(0),
                (Aggregator::And, _) => doc! { "$and": parts },
                (Aggregator::Or, _) => doc! { "$or": parts },
            })
        }
        ConditionTree::Leaf { field, operator, value } => {
            if !operator.is_native() {
                return Err(DsError::UnsupportedOperator(operator.name().to_string()));
            }
            let resolved = graph.resolve(collection, field)?;
            let native = resolved.collection.native_type(resolved.column);
            let path = locate(&resolved);
            let (path, native) = match coercions.get(&path) {
                Some(name) if operator.is_string_only() => (name.clone(), NativeType::String),
                _ => (path, native),
            };
            let mut out = Document::new();
            out.insert(path, predicate(*operator, value, native)?);
            Ok(out)
        }
    }
}

fn predicate(operator: Operator, value: &Bson, native: NativeType) -> Result<Document, DsError> {
    Ok(match operator {
        Operator::Present => doc! { "$exists": true, "$ne": null },
        Operator::Equal => doc! { "$eq": cast(value, native) },
        Operator::NotEqual => doc! { "$ne": cast(value, native) },
        Operator::LessThan => doc! { "$lt": cast(value, native) },
        Operator::GreaterThan => doc! { "$gt": cast(value, native) },
        Operator::In => doc! { "$in": as_list(cast(value, native)) },
        Operator::NotIn | Operator::IncludesNone => doc! { "$nin": as_list(cast(value, native)) },
        Operator::IncludesAll => doc! { "$all": as_list(cast(value, native)) },
        Operator::Like => doc! { "$regex": like_to_regex(&as_text(value)), "$options": "" },
        Operator::ILike => doc! { "$regex": like_to_regex(&as_text(value)), "$options": "i" },
        Operator::Match => {
            let (pattern, flags) = split_regex_literal(&as_text(value));
            doc! { "$regex": pattern, "$options": flags }
        }
        other => return Err(DsError::UnsupportedOperator(other.name().to_string())),
    })
}

fn as_list(value: Bson) -> Vec<Bson> {
    match value {
        Bson::Array(items) => items,
        Bson::Null => Vec::new(),
        other => vec![other],
    }
}

fn as_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Casts a request value to the storage type of the field it is compared with.
/// Values not in the expected external form pass through unchanged.
#[must_use]
pub fn cast(value: &Bson, native: NativeType) -> Bson {
    match (native, value) {
        (_, Bson::Array(items)) => Bson::Array(items.iter().map(|v| cast(v, native)).collect()),
        (NativeType::Date, Bson::String(s)) => parse_date(s).map_or_else(
            || {
                log::warn!("value '{s}' is not an ISO-8601 date, compared as is");
                value.clone()
            },
            Bson::DateTime,
        ),
        (NativeType::ObjectId, Bson::String(s)) => ObjectId::parse_str(s).map_or_else(
            |_| {
                log::warn!("value '{s}' is not an object id, compared as is");
                value.clone()
            },
            Bson::ObjectId,
        ),
        _ => value.clone(),
    }
}

/// RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
#[must_use]
pub fn parse_date(s: &str) -> Option<bson::DateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(bson::DateTime::from_millis(dt.timestamp_millis()));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(bson::DateTime::from_millis(day.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis()))
}

/// SQL wildcard pattern to an anchored regular expression: `%` is any run, `_` one character.
#[must_use]
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// `/pattern/flags` to its parts; anything else is a bare pattern.
fn split_regex_literal(s: &str) -> (String, String) {
    if let Some(body) = s.strip_prefix('/')
        && let Some(end) = body.rfind('/')
    {
        return (body[..end].to_string(), body[end + 1..].to_string());
    }
    (s.to_string(), String::new())
}
