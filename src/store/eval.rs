//! Value ordering and `$match` evaluation for the in-memory store.

use crate::errors::DsError;
use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Total order over BSON values: numbers compare numerically across widths, values of the
/// same type compare by content, other pairs by type rank.
#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Array(x), Bson::Array(y)) => compare_seq(x.iter(), y.iter()),
        (Bson::Document(x), Bson::Document(y)) => compare_seq(x.values(), y.values()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_seq<'a>(mut x: impl Iterator<Item = &'a Bson>, mut y: impl Iterator<Item = &'a Bson>) -> Ordering {
    loop {
        match (x.next(), y.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => match compare_bson(a, b) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

/// Sort rank of each type; numbers share one rank.
fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

pub(crate) fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

/// Equality as the store sees it: `1 == 1.0`, everything else structural.
#[must_use]
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b) && compare_bson(a, b) == Ordering::Equal
}

/// Values reached by a dotted path, descending implicitly into arrays of documents.
/// Numeric segments index arrays.
#[must_use]
pub fn values_at<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segs: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segs.split_first()
        && let Some(v) = doc.get(*head)
    {
        collect(v, rest, &mut out);
    }
    out
}

fn collect<'a>(value: &'a Bson, segs: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segs.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(d) => {
            if let Some(v) = d.get(*head) {
                collect(v, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(i) = head.parse::<usize>() {
                if let Some(v) = items.get(i) {
                    collect(v, rest, out);
                }
            } else {
                for item in items.iter().filter(|i| matches!(i, Bson::Document(_))) {
                    collect(item, segs, out);
                }
            }
        }
        _ => {}
    }
}

/// Evaluates a native filter document against a record.
///
/// # Errors
/// Fails on an unknown operator or an invalid regular expression.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, DsError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for f in sub_filters(cond)? {
                    if !matches(doc, f)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_matches(doc, cond)?,
            "$nor" => !any_matches(doc, cond)?,
            op if op.starts_with('$') => return Err(DsError::Store(format!("unknown top-level operator {op}"))),
            path => field_matches(&values_at(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_matches(doc: &Document, cond: &Bson) -> Result<bool, DsError> {
    for f in sub_filters(cond)? {
        if matches(doc, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn sub_filters(cond: &Bson) -> Result<Vec<&Document>, DsError> {
    let Bson::Array(items) = cond else {
        return Err(DsError::Store("logical operators take an array".into()));
    };
    items
        .iter()
        .map(|i| i.as_document().ok_or_else(|| DsError::Store("logical operands must be documents".into())))
        .collect()
}

fn is_operator_doc(cond: &Bson) -> Option<&Document> {
    match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(values: &[&Bson], cond: &Bson) -> Result<bool, DsError> {
    let Some(ops) = is_operator_doc(cond) else {
        return Ok(eq(values, cond));
    };
    let options = ops.get_str("$options").unwrap_or_default();
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => eq(values, arg),
            "$ne" => !eq(values, arg),
            "$gt" => ordered(values, arg, Ordering::is_gt),
            "$gte" => ordered(values, arg, Ordering::is_ge),
            "$lt" => ordered(values, arg, Ordering::is_lt),
            "$lte" => ordered(values, arg, Ordering::is_le),
            "$in" => list(arg)?.iter().any(|v| eq(values, v)),
            "$nin" => !list(arg)?.iter().any(|v| eq(values, v)),
            "$all" => {
                let wanted = list(arg)?;
                !wanted.is_empty() && wanted.iter().all(|v| eq(values, v))
            }
            "$exists" => !values.is_empty() == arg.as_bool().unwrap_or(true),
            "$regex" => regex_matches(values, arg, options)?,
            "$options" => true,
            other => return Err(DsError::UnsupportedOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Each value plus, for arrays, their elements.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        out.push(*v);
        if let Bson::Array(items) = *v {
            out.extend(items.iter());
        }
    }
    out
}

fn eq(values: &[&Bson], expected: &Bson) -> bool {
    if matches!(expected, Bson::Null) && values.is_empty() {
        return true;
    }
    candidates(values).into_iter().any(|v| bson_eq(v, expected))
}

fn ordered(values: &[&Bson], bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    candidates(values)
        .into_iter()
        .filter(|v| !matches!(v, Bson::Array(_)) && type_rank(v) == type_rank(bound))
        .any(|v| accept(compare_bson(v, bound)))
}

fn list(arg: &Bson) -> Result<&[Bson], DsError> {
    match arg {
        Bson::Array(items) => Ok(items),
        other => Err(DsError::Store(format!("expected an array, got {other}"))),
    }
}

fn regex_matches(values: &[&Bson], pattern: &Bson, options: &str) -> Result<bool, DsError> {
    let Bson::String(pattern) = pattern else {
        return Err(DsError::Store("$regex takes a string".into()));
    };
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| DsError::Store(e.to_string()))?;
    Ok(candidates(values).into_iter().any(|v| matches!(v, Bson::String(s) if re.is_match(s))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(compare_bson(&Bson::Int32(2), &Bson::Double(2.0)), Ordering::Equal);
        assert_eq!(compare_bson(&Bson::Int64(3), &Bson::Int32(2)), Ordering::Greater);
        assert!(bson_eq(&Bson::Int32(1), &Bson::Int64(1)));
        assert!(!bson_eq(&Bson::Int32(1), &Bson::String("1".into())));
    }

    #[test]
    fn null_matches_missing() {
        let d = doc! { "a": 1 };
        assert!(matches(&d, &doc! { "b": null }).unwrap());
        assert!(!matches(&d, &doc! { "b": { "$exists": true, "$ne": null } }).unwrap());
        assert!(matches(&d, &doc! { "a": { "$exists": true, "$ne": null } }).unwrap());
    }

    #[test]
    fn array_fields_match_any_element() {
        let d = doc! { "tags": ["x", "y"], "items": [ { "n": 1 }, { "n": 5 } ] };
        assert!(matches(&d, &doc! { "tags": "y" }).unwrap());
        assert!(matches(&d, &doc! { "items.n": { "$gt": 4 } }).unwrap());
        assert!(matches(&d, &doc! { "tags": { "$all": ["x", "y"] } }).unwrap());
        assert!(!matches(&d, &doc! { "tags": { "$nin": ["x"] } }).unwrap());
    }

    #[test]
    fn comparisons_stay_within_type() {
        let d = doc! { "a": "10" };
        assert!(!matches(&d, &doc! { "a": { "$gt": 5 } }).unwrap());
        assert!(matches(&d, &doc! { "a": { "$gt": "0" } }).unwrap());
    }

    #[test]
    fn logical_operators() {
        let d = doc! { "a": 1 };
        assert!(matches(&d, &doc! { "$or": [ { "a": 2 }, { "a": 1 } ] }).unwrap());
        assert!(!matches(&d, &doc! { "$nor": [ {} ] }).unwrap());
        assert!(matches(&d, &doc! { "$and": [ { "a": 1 } ] }).unwrap());
    }

    #[test]
    fn regex_honors_options() {
        let d = doc! { "name": "Alice" };
        assert!(matches(&d, &doc! { "name": { "$regex": "^al", "$options": "i" } }).unwrap());
        assert!(!matches(&d, &doc! { "name": { "$regex": "^al", "$options": "" } }).unwrap());
    }
}
