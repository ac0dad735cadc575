//! Native per-model schema description, as handed over by the document store's ODM.
//!
//! Keys of a [`NativeSchema`] may be dotted (`engine.identification.manufacturer`) for
//! nested plain objects; embedded subdocument schemas (single or arrays) nest explicitly.

use bson::Bson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NativeType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Binary,
    Mixed,
}

impl NativeType {
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeField {
    #[serde(rename = "type")]
    pub native_type: NativeType,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Bson>,
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, rename = "ref")]
    pub reference_to: Option<String>,
}

impl NativeField {
    #[must_use]
    pub const fn new(native_type: NativeType) -> Self {
        Self {
            native_type,
            is_array: false,
            required: false,
            default_value: None,
            enum_values: None,
            reference_to: None,
        }
    }

    /// An object id pointing at another model's `_id`.
    #[must_use]
    pub fn reference(target: &str) -> Self {
        Self { reference_to: Some(target.to_string()), ..Self::new(NativeType::ObjectId) }
    }

    #[must_use]
    pub const fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Bson>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| (*v).to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativePath {
    Embedded {
        schema: NativeSchema,
        #[serde(default)]
        is_array: bool,
    },
    Field(NativeField),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeSchema {
    pub paths: BTreeMap<String, NativePath>,
}

impl NativeSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, path: &str, field: NativeField) -> Self {
        self.paths.insert(path.to_string(), NativePath::Field(field));
        self
    }

    #[must_use]
    pub fn embedded(mut self, path: &str, schema: Self) -> Self {
        self.paths.insert(path.to_string(), NativePath::Embedded { schema, is_array: false });
        self
    }

    #[must_use]
    pub fn embedded_array(mut self, path: &str, schema: Self) -> Self {
        self.paths.insert(path.to_string(), NativePath::Embedded { schema, is_array: true });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeModel {
    pub name: String,
    pub schema: NativeSchema,
}

impl NativeModel {
    #[must_use]
    pub fn new(name: &str, schema: NativeSchema) -> Self {
        Self { name: name.to_string(), schema }
    }
}
