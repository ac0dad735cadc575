use crate::errors::DsError;
use crate::pipeline::joints::locate;
use crate::pipeline::stage::{PipelineStage, field_ref};
use crate::query::{AggregateOperation, Aggregation, DateOperation};
use crate::relation::{CollectionDef, RelationGraph};
use bson::{Bson, Document, doc};

/// Key of the n-th group field in the compound `_id`.
#[must_use]
pub fn group_key(index: usize) -> String {
    format!("g{index}")
}

/// `$group`, the optional result cap and the reshaping `$project`.
///
/// Output rows are `{value, group}` where `group` is null without group fields and
/// `{g0, g1, ...}` otherwise.
///
/// # Errors
/// Fails when the aggregated or a grouped field does not resolve.
pub fn aggregate(
    graph: &RelationGraph,
    collection: &CollectionDef,
    aggregation: &Aggregation,
    limit: Option<u64>,
) -> Result<Vec<PipelineStage>, DsError> {
    let field = match &aggregation.field {
        Some(f) => Some(locate(&graph.resolve(collection, f)?)),
        None => None,
    };

    let id = if aggregation.groups.is_empty() {
        Bson::Null
    } else {
        let mut keys = Document::new();
        for (i, group) in aggregation.groups.iter().enumerate() {
            let path = locate(&graph.resolve(collection, &group.field)?);
            keys.insert(group_key(i), group_expression(&path, group.operation));
        }
        Bson::Document(keys)
    };

    let mut stages = vec![PipelineStage::Group(doc! {
        "_id": id,
        "value": accumulator(aggregation.operation, field.as_deref()),
    })];
    if let Some(n) = limit {
        stages.push(PipelineStage::Sort(doc! { "value": -1 }));
        stages.push(PipelineStage::Limit(n));
    }
    stages.push(PipelineStage::Project(doc! { "_id": 0, "value": 1, "group": "$_id" }));
    Ok(stages)
}

fn accumulator(operation: AggregateOperation, field: Option<&str>) -> Document {
    match (operation, field) {
        (AggregateOperation::Count, None) => doc! { "$sum": 1 },
        (AggregateOperation::Count, Some(f)) => doc! {
            "$sum": { "$cond": [ { "$eq": [ { "$ifNull": [ field_ref(f), null ] }, null ] }, 0, 1 ] }
        },
        (op, f) => {
            let name = match op {
                AggregateOperation::Sum | AggregateOperation::Count => "$sum",
                AggregateOperation::Avg => "$avg",
                AggregateOperation::Max => "$max",
                AggregateOperation::Min => "$min",
            };
            let mut acc = Document::new();
            acc.insert(name, f.map_or(Bson::Null, field_ref));
            acc
        }
    }
}

fn group_expression(path: &str, operation: Option<DateOperation>) -> Bson {
    let date = field_ref(path);
    let formatted = |format: &str, date: Bson| -> Bson {
        doc! { "$dateToString": { "format": format, "date": date } }.into()
    };
    match operation {
        None => date,
        Some(DateOperation::Year) => formatted("%Y-01-01", date),
        Some(DateOperation::Month) => formatted("%Y-%m-01", date),
        Some(DateOperation::Day) => formatted("%Y-%m-%d", date),
        Some(DateOperation::Week) => formatted(
            "%Y-%m-%d",
            doc! { "$dateTrunc": { "date": date, "unit": "week", "startOfWeek": "monday" } }.into(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_without_field_counts_documents() {
        assert_eq!(accumulator(AggregateOperation::Count, None), doc! { "$sum": 1 });
    }

    #[test]
    fn count_with_field_skips_nulls() {
        let acc = accumulator(AggregateOperation::Count, Some("price"));
        assert!(acc.get_document("$sum").unwrap().contains_key("$cond"));
    }

    #[test]
    fn week_groups_truncate_first() {
        let expr = group_expression("createdAt", Some(DateOperation::Week));
        let inner = expr.as_document().unwrap().get_document("$dateToString").unwrap();
        assert!(inner.get_document("date").unwrap().contains_key("$dateTrunc"));
    }
}
