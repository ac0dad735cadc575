use crate::errors::DsError;
use crate::utils::paths::RELATION_SEP;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Present,
    Blank,
    Missing,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    In,
    NotIn,
    Like,
    ILike,
    Match,
    Contains,
    StartsWith,
    EndsWith,
    LongerThan,
    ShorterThan,
    IncludesAll,
    IncludesNone,
}

impl Operator {
    pub const ALL: [Self; 19] = [
        Self::Present,
        Self::Blank,
        Self::Missing,
        Self::Equal,
        Self::NotEqual,
        Self::LessThan,
        Self::GreaterThan,
        Self::In,
        Self::NotIn,
        Self::Like,
        Self::ILike,
        Self::Match,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::LongerThan,
        Self::ShorterThan,
        Self::IncludesAll,
        Self::IncludesNone,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Blank => "blank",
            Self::Missing => "missing",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Like => "like",
            Self::ILike => "i_like",
            Self::Match => "match",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::LongerThan => "longer_than",
            Self::ShorterThan => "shorter_than",
            Self::IncludesAll => "includes_all",
            Self::IncludesNone => "includes_none",
        }
    }

    /// Operators with string semantics; on a non-string column they run against a
    /// stringified copy of the value.
    #[must_use]
    pub const fn is_string_only(self) -> bool {
        matches!(self, Self::Like | Self::ILike | Self::Match)
    }

    /// Operators the pipeline compiler lowers natively.
    #[must_use]
    pub const fn is_native(self) -> bool {
        !matches!(
            self,
            Self::Blank
                | Self::Missing
                | Self::Contains
                | Self::StartsWith
                | Self::EndsWith
                | Self::LongerThan
                | Self::ShorterThan
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = DsError;

    /// Accepts `not_equal`, `NotEqual` and `notequal` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s.chars().filter(|c| *c != '_').collect::<String>().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.name().replace('_', "") == key)
            .ok_or_else(|| DsError::UnsupportedOperator(s.to_string()))
    }
}

impl TryFrom<String> for Operator {
    type Error = DsError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregator {
    And,
    Or,
}

impl FromStr for Aggregator {
    type Err = DsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(DsError::UnsupportedAggregator(s.to_string())),
        }
    }
}

/// Boolean predicate over a collection's columns. Leaf fields may cross relations with `:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "super::parse::ConditionTreeSerde")]
pub enum ConditionTree {
    Branch { aggregator: Aggregator, conditions: Vec<ConditionTree> },
    Leaf { field: String, operator: Operator, value: Bson },
}

impl ConditionTree {
    #[must_use]
    pub fn leaf(field: &str, operator: Operator, value: impl Into<Bson>) -> Self {
        Self::Leaf { field: field.to_string(), operator, value: value.into() }
    }

    #[must_use]
    pub fn present(field: &str) -> Self {
        Self::leaf(field, Operator::Present, Bson::Null)
    }

    #[must_use]
    pub const fn and(conditions: Vec<Self>) -> Self {
        Self::Branch { aggregator: Aggregator::And, conditions }
    }

    #[must_use]
    pub const fn or(conditions: Vec<Self>) -> Self {
        Self::Branch { aggregator: Aggregator::Or, conditions }
    }

    /// Every leaf field, in tree order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Leaf { field, .. } => vec![field.as_str()],
            Self::Branch { conditions, .. } => conditions.iter().flat_map(Self::fields).collect(),
        }
    }
}

/// Requested columns. `relation:column` entries select through a relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(Vec<String>);

impl Projection {
    #[must_use]
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for f in fields {
            let f = f.into();
            if !out.contains(&f) {
                out.push(f);
            }
        }
        Self(out)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Own columns, without relation paths.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|f| !f.contains(RELATION_SEP))
    }

    /// Relation name to the projection requested inside it.
    #[must_use]
    pub fn relations(&self) -> BTreeMap<String, Self> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for f in &self.0 {
            if let Some((relation, rest)) = f.split_once(RELATION_SEP) {
                out.entry(relation.to_string()).or_default().push(rest.to_string());
            }
        }
        out.into_iter().map(|(k, v)| (k, Self::new(v))).collect()
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.0.iter().chain(&other.0).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    #[serde(default = "ascending")]
    pub ascending: bool,
}

const fn ascending() -> bool {
    true
}

impl SortClause {
    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), ascending: true }
    }

    #[must_use]
    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), ascending: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Page {
    #[must_use]
    pub const fn new(skip: u64, limit: u64) -> Self {
        Self { skip: Some(skip), limit: Some(limit) }
    }
}

/// Condition tree plus ordering and paging of a `list` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedFilter {
    #[serde(default)]
    pub condition_tree: Option<ConditionTree>,
    #[serde(default)]
    pub sort: Vec<SortClause>,
    #[serde(default)]
    pub page: Option<Page>,
}

impl PaginatedFilter {
    #[must_use]
    pub fn with_tree(tree: ConditionTree) -> Self {
        Self { condition_tree: Some(tree), ..Self::default() }
    }

    #[must_use]
    pub fn sorted(mut self, sort: Vec<SortClause>) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub const fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOperation {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateOperation {
    Year,
    Month,
    Week,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationGroup {
    pub field: String,
    #[serde(default)]
    pub operation: Option<DateOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub operation: AggregateOperation,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub groups: Vec<AggregationGroup>,
}

impl Aggregation {
    #[must_use]
    pub fn new(operation: AggregateOperation, field: Option<&str>) -> Self {
        Self { operation, field: field.map(str::to_string), groups: Vec::new() }
    }

    #[must_use]
    pub fn group_by(mut self, field: &str, operation: Option<DateOperation>) -> Self {
        self.groups.push(AggregationGroup { field: field.to_string(), operation });
        self
    }

    /// Columns the aggregation reads.
    #[must_use]
    pub fn projection(&self) -> Projection {
        Projection::new(self.field.iter().cloned().chain(self.groups.iter().map(|g| g.field.clone())))
    }
}

/// One row of an aggregation: the value and the group key, keyed by logical field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub value: Bson,
    pub group: BTreeMap<String, Bson>,
}
