use serde::Serialize;

/// One promotion boundary crossed between a model's root and a collection.
///
/// `prefix` is the full physical path of the boundary (`None` for the identity entry);
/// `as_fields` and `as_models` are relative to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackEntry {
    pub prefix: Option<String>,
    pub as_fields: Vec<String>,
    pub as_models: Vec<String>,
}

impl StackEntry {
    #[must_use]
    pub fn identity(as_fields: Vec<String>, as_models: Vec<String>) -> Self {
        Self { prefix: None, as_fields, as_models }
    }
}

/// Ordered boundaries from the physical root down to a collection. Never empty.
pub type Stack = Vec<StackEntry>;
