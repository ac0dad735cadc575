use crate::errors::DsError;
use bson::Bson;
use serde::{Deserialize, Serialize};

use super::types::{Aggregation, ConditionTree, Operator, PaginatedFilter, Projection};

// Serde-facing shape of a condition tree; names are validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionTreeSerde {
    Branch {
        aggregator: String,
        conditions: Vec<ConditionTreeSerde>,
    },
    Leaf {
        field: String,
        operator: String,
        #[serde(default)]
        value: Option<Bson>,
    },
}

impl TryFrom<ConditionTreeSerde> for ConditionTree {
    type Error = DsError;
    fn try_from(ts: ConditionTreeSerde) -> Result<Self, Self::Error> {
        Ok(match ts {
            ConditionTreeSerde::Branch { aggregator, conditions } => Self::Branch {
                aggregator: aggregator.parse()?,
                conditions: conditions.into_iter().map(Self::try_from).collect::<Result<_, _>>()?,
            },
            ConditionTreeSerde::Leaf { field, operator, value } => Self::Leaf {
                field,
                operator: operator.parse::<Operator>()?,
                value: value.unwrap_or(Bson::Null),
            },
        })
    }
}

/// A `list` or `aggregate` request as read from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub collection: String,
    #[serde(flatten)]
    pub filter: PaginatedFilter,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
    /// Result cap of an aggregation.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// # Errors
/// Returns an error if the JSON string is malformed or names an unknown operator or aggregator.
pub fn parse_request_json(json: &str) -> Result<Request, DsError> {
    Ok(serde_json::from_str(json)?)
}

/// # Errors
/// Returns an error if the JSON string is not a valid condition tree.
pub fn parse_condition_tree_json(json: &str) -> Result<ConditionTree, DsError> {
    Ok(serde_json::from_str(json)?)
}
