//! Request vocabulary: condition trees, projections, sorts, pages and aggregations.

pub mod parse;
pub mod types;

pub use parse::{Request, parse_condition_tree_json, parse_request_json};
pub use types::{
    AggregateOperation, AggregateResult, Aggregation, AggregationGroup, Aggregator, ConditionTree,
    DateOperation, Operator, Page, PaginatedFilter, Projection, SortClause,
};
