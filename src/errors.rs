use thiserror::Error;

#[derive(Debug, Error)]
pub enum DsError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(String),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    // Configuration errors, raised while the datasource is constructed.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid relation target: field '{field}' of '{collection}' references unknown collection '{target}'")]
    InvalidRelationTarget { collection: String, field: String, target: String },

    #[error("Stack can never be empty")]
    EmptyStack,

    #[error("Invalid flatten path '{path}' on model '{model}': {reason}")]
    InvalidFlattenPath { model: String, path: String, reason: String },

    #[error("Unknown flatten mode '{0}' (expected auto, manual, none or legacy)")]
    InvalidFlattenMode(String),

    #[error("Collection name collision: {0}")]
    DuplicateCollection(String),

    #[error("Field name collision on '{collection}': {field}")]
    DuplicateField { collection: String, field: String },

    // Compilation errors, raised per request.
    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Field not found: {0}")]
    NoSuchField(String),

    #[error("Expected a leaf at '{0}'")]
    NotALeaf(String),

    #[error("Unsupported operator: '{0}'")]
    UnsupportedOperator(String),

    #[error("Unsupported condition tree aggregator: '{0}'")]
    UnsupportedAggregator(String),

    #[error("Unsupported relation '{relation}' ({kind}) in '{field}'")]
    UnsupportedRelation { field: String, relation: String, kind: &'static str },

    #[error("Fetching virtual parent deeper than 1 level is not supported: '{0}'")]
    NestedParentLink(String),

    // Data errors.
    #[error("Invalid record id: {0}")]
    InvalidId(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<std::io::Error> for DsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
