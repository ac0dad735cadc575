//! Aggregation expressions: field references, literals and the operator subset pipelines use.
//!
//! `None` stands for a missing value, distinct from an explicit null.

use crate::errors::DsError;
use crate::store::eval::{bson_eq, compare_bson};
use bson::{Bson, Document};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use std::fmt::Write as _;

/// Evaluates `expr` with `root` as both `$$ROOT` and the current document.
///
/// # Errors
/// Fails on unknown operators or operands of the wrong type.
pub fn eval(expr: &Bson, root: &Document) -> Result<Option<Bson>, DsError> {
    match expr {
        Bson::String(s) if s.starts_with("$$") => Ok(variable(s, root)),
        Bson::String(s) if s.starts_with('$') => Ok(field(root, &s[1..])),
        Bson::Document(d) => match single_operator(d) {
            Some((op, arg)) => operator(op, arg, root),
            None => {
                let mut out = Document::new();
                for (k, v) in d {
                    if let Some(value) = eval(v, root)? {
                        out.insert(k.clone(), value);
                    }
                }
                Ok(Some(Bson::Document(out)))
            }
        },
        Bson::Array(items) => Ok(Some(Bson::Array(
            items.iter().map(|i| eval(i, root).map(or_null)).collect::<Result<_, _>>()?,
        ))),
        other => Ok(Some(other.clone())),
    }
}

fn single_operator(d: &Document) -> Option<(&str, &Bson)> {
    let mut it = d.iter();
    match (it.next(), it.next()) {
        (Some((k, v)), None) if k.starts_with('$') => Some((k.as_str(), v)),
        _ => None,
    }
}

fn or_null(v: Option<Bson>) -> Bson {
    v.unwrap_or(Bson::Null)
}

fn variable(s: &str, root: &Document) -> Option<Bson> {
    let rest = s.strip_prefix("$$ROOT").or_else(|| s.strip_prefix("$$CURRENT"))?;
    match rest.strip_prefix('.') {
        Some(path) => field(root, path),
        None if rest.is_empty() => Some(Bson::Document(root.clone())),
        None => None,
    }
}

/// Field reference semantics: arrays of documents map to the arrays of their sub-values.
#[must_use]
pub fn field(root: &Document, path: &str) -> Option<Bson> {
    let segs: Vec<&str> = path.split('.').collect();
    let (head, rest) = segs.split_first()?;
    descend(root.get(*head)?, rest)
}

fn descend(value: &Bson, segs: &[&str]) -> Option<Bson> {
    let Some((head, rest)) = segs.split_first() else {
        return Some(value.clone());
    };
    match value {
        Bson::Document(d) => descend(d.get(*head)?, rest),
        Bson::Array(items) => Some(Bson::Array(
            items.iter().filter(|i| matches!(i, Bson::Document(_))).filter_map(|i| descend(i, segs)).collect(),
        )),
        _ => None,
    }
}

/// Aggregation truthiness: false, null, missing and zero are false.
#[must_use]
pub fn truthy(v: Option<&Bson>) -> bool {
    match v {
        None | Some(Bson::Null | Bson::Undefined | Bson::Boolean(false)) => false,
        Some(Bson::Int32(i)) => *i != 0,
        Some(Bson::Int64(i)) => *i != 0,
        Some(Bson::Double(f)) => *f != 0.0,
        Some(_) => true,
    }
}

fn args<'a>(arg: &'a Bson, op: &str, arity: Option<usize>) -> Result<Vec<&'a Bson>, DsError> {
    let items: Vec<&Bson> = match arg {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    match arity {
        Some(n) if items.len() != n => Err(DsError::Store(format!("{op} takes {n} arguments"))),
        _ => Ok(items),
    }
}

fn operator(op: &str, arg: &Bson, root: &Document) -> Result<Option<Bson>, DsError> {
    let value = match op {
        "$literal" => arg.clone(),
        "$concat" => {
            let mut out = String::new();
            for a in args(arg, op, None)? {
                match eval(a, root)? {
                    None | Some(Bson::Null) => return Ok(Some(Bson::Null)),
                    Some(Bson::String(s)) => out.push_str(&s),
                    Some(other) => return Err(DsError::Store(format!("$concat only supports strings, got {other}"))),
                }
            }
            Bson::String(out)
        }
        "$toString" => {
            let a = args(arg, op, Some(1))?;
            match eval(a[0], root)? {
                None | Some(Bson::Null) => Bson::Null,
                Some(v) => Bson::String(to_string(&v)?),
            }
        }
        "$ifNull" => {
            let a = args(arg, op, None)?;
            let mut last = Bson::Null;
            for (i, e) in a.iter().enumerate() {
                let v = eval(e, root)?;
                match v {
                    Some(v) if !matches!(v, Bson::Null) => return Ok(Some(v)),
                    other if i + 1 == a.len() => last = or_null(other),
                    _ => {}
                }
            }
            last
        }
        "$mergeObjects" => {
            let mut out = Document::new();
            for a in args(arg, op, None)? {
                match eval(a, root)? {
                    None | Some(Bson::Null) => {}
                    Some(Bson::Document(d)) => {
                        for (k, v) in d {
                            out.insert(k, v);
                        }
                    }
                    Some(other) => return Err(DsError::Store(format!("$mergeObjects requires objects, got {other}"))),
                }
            }
            Bson::Document(out)
        }
        "$cond" => {
            let (test, then, otherwise) = match arg {
                Bson::Document(d) => (
                    d.get("if").ok_or_else(|| DsError::Store("$cond needs 'if'".into()))?,
                    d.get("then").ok_or_else(|| DsError::Store("$cond needs 'then'".into()))?,
                    d.get("else").ok_or_else(|| DsError::Store("$cond needs 'else'".into()))?,
                ),
                _ => {
                    let a = args(arg, op, Some(3))?;
                    (a[0], a[1], a[2])
                }
            };
            let branch = if truthy(eval(test, root)?.as_ref()) { then } else { otherwise };
            return eval(branch, root);
        }
        "$eq" | "$ne" => {
            let a = args(arg, op, Some(2))?;
            let equal = bson_eq(&or_null(eval(a[0], root)?), &or_null(eval(a[1], root)?));
            Bson::Boolean(equal == (op == "$eq"))
        }
        "$in" => {
            let a = args(arg, op, Some(2))?;
            let needle = or_null(eval(a[0], root)?);
            match eval(a[1], root)? {
                Some(Bson::Array(items)) => Bson::Boolean(items.iter().any(|i| bson_eq(i, &needle))),
                _ => return Err(DsError::Store("$in requires an array as second argument".into())),
            }
        }
        "$type" => {
            let a = args(arg, op, Some(1))?;
            Bson::String(type_name(eval(a[0], root)?.as_ref()).to_string())
        }
        "$dateToString" => {
            let spec = arg.as_document().ok_or_else(|| DsError::Store("$dateToString takes an object".into()))?;
            let format = spec.get_str("format").unwrap_or("%Y-%m-%dT%H:%M:%S.%LZ");
            match eval(spec.get("date").unwrap_or(&Bson::Null), root)? {
                None | Some(Bson::Null) => Bson::Null,
                Some(Bson::DateTime(dt)) => Bson::String(format_date(&dt, format)?),
                Some(other) => return Err(DsError::Store(format!("can't convert from {other} to date"))),
            }
        }
        "$dateTrunc" => {
            let spec = arg.as_document().ok_or_else(|| DsError::Store("$dateTrunc takes an object".into()))?;
            match eval(spec.get("date").unwrap_or(&Bson::Null), root)? {
                None | Some(Bson::Null) => Bson::Null,
                Some(Bson::DateTime(dt)) => Bson::DateTime(truncate(
                    &dt,
                    spec.get_str("unit").unwrap_or("day"),
                    spec.get_str("startOfWeek").unwrap_or("sunday"),
                )?),
                Some(other) => return Err(DsError::Store(format!("can't convert from {other} to date"))),
            }
        }
        other => return Err(DsError::Store(format!("unsupported expression operator {other}"))),
    };
    Ok(Some(value))
}

/// Native type name as reported by `$type`.
#[must_use]
pub const fn type_name(v: Option<&Bson>) -> &'static str {
    match v {
        None => "missing",
        Some(Bson::Null) => "null",
        Some(Bson::Boolean(_)) => "bool",
        Some(Bson::Int32(_)) => "int",
        Some(Bson::Int64(_)) => "long",
        Some(Bson::Double(_)) => "double",
        Some(Bson::Decimal128(_)) => "decimal",
        Some(Bson::String(_)) => "string",
        Some(Bson::Document(_)) => "object",
        Some(Bson::Array(_)) => "array",
        Some(Bson::ObjectId(_)) => "objectId",
        Some(Bson::DateTime(_)) => "date",
        Some(Bson::Binary(_)) => "binData",
        Some(Bson::RegularExpression(_)) => "regex",
        Some(Bson::Timestamp(_)) => "timestamp",
        Some(_) => "unknown",
    }
}

fn to_string(v: &Bson) -> Result<String, DsError> {
    Ok(match v {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::DateTime(dt) => format_date(dt, "%Y-%m-%dT%H:%M:%S.%LZ")?,
        other => return Err(DsError::Store(format!("unsupported conversion to string from {other}"))),
    })
}

fn to_chrono(dt: &bson::DateTime) -> Result<DateTime<Utc>, DsError> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).ok_or_else(|| DsError::Store(format!("date out of range: {dt}")))
}

fn format_date(dt: &bson::DateTime, format: &str) -> Result<String, DsError> {
    let chrono_format = format.replace("%L", "%3f");
    let mut out = String::new();
    write!(out, "{}", to_chrono(dt)?.format(&chrono_format))
        .map_err(|_| DsError::Store(format!("invalid date format '{format}'")))?;
    Ok(out)
}

fn truncate(dt: &bson::DateTime, unit: &str, start_of_week: &str) -> Result<bson::DateTime, DsError> {
    let value = to_chrono(dt)?;
    let date = value.date_naive();
    let day = match unit {
        "day" => date,
        "month" => date.with_day(1).unwrap_or(date),
        "year" => date.with_ordinal(1).unwrap_or(date),
        "week" => {
            let first = week_start(start_of_week)?;
            let offset = (7 + date.weekday().num_days_from_monday() - first.num_days_from_monday()) % 7;
            date - Duration::days(i64::from(offset))
        }
        other => return Err(DsError::Store(format!("unsupported $dateTrunc unit {other}"))),
    };
    let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(|| DsError::Store(format!("invalid date {day}")))?;
    Ok(bson::DateTime::from_millis(midnight.and_utc().timestamp_millis()))
}

fn week_start(name: &str) -> Result<Weekday, DsError> {
    match name.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        other => Err(DsError::Store(format!("unknown startOfWeek {other}"))),
    }
}

/// Orders accumulated values for `$max`/`$min`.
pub(crate) fn pick(current: Option<Bson>, candidate: &Bson, want_greater: bool) -> Option<Bson> {
    if matches!(candidate, Bson::Null) {
        return current;
    }
    match current {
        Some(c) if (compare_bson(candidate, &c).is_gt()) != want_greater => Some(c),
        _ => Some(candidate.clone()),
    }
}
