//! Datasource settings: which virtualization policy applies and its per-model path lists.

use crate::errors::DsError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

pub const ENV_FLATTEN_MODE: &str = "NEXUSREL_FLATTEN_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlattenMode {
    /// Promote arrays of subdocuments/references, flatten deeply nested leaves.
    #[default]
    Auto,
    /// Per-model `as_fields`/`as_models` from `flatten_options`.
    Manual,
    None,
    /// Cut points from `legacy_as_models`, ancestors included.
    Legacy,
}

impl FromStr for FlattenMode {
    type Err = DsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            "legacy" => Ok(Self::Legacy),
            other => Err(DsError::InvalidFlattenMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFlatten {
    #[serde(default)]
    pub as_fields: Vec<String>,
    #[serde(default)]
    pub as_models: Vec<String>,
}

/// Construction-time settings of a datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceOptions {
    #[serde(default)]
    pub flatten_mode: FlattenMode,
    /// Used by [`FlattenMode::Manual`].
    #[serde(default)]
    pub flatten_options: BTreeMap<String, ModelFlatten>,
    /// Used by [`FlattenMode::Legacy`].
    #[serde(default)]
    pub legacy_as_models: BTreeMap<String, Vec<String>>,
}

impl DatasourceOptions {
    #[must_use]
    pub fn with_mode(flatten_mode: FlattenMode) -> Self {
        Self { flatten_mode, ..Self::default() }
    }

    #[must_use]
    pub fn manual(mut self, model: &str, as_fields: &[&str], as_models: &[&str]) -> Self {
        self.flatten_mode = FlattenMode::Manual;
        self.flatten_options.insert(
            model.to_string(),
            ModelFlatten {
                as_fields: as_fields.iter().map(|s| (*s).to_string()).collect(),
                as_models: as_models.iter().map(|s| (*s).to_string()).collect(),
            },
        );
        self
    }

    #[must_use]
    pub fn legacy(mut self, model: &str, cuts: &[&str]) -> Self {
        self.flatten_mode = FlattenMode::Legacy;
        self.legacy_as_models
            .insert(model.to_string(), cuts.iter().map(|s| (*s).to_string()).collect());
        self
    }

    /// # Errors
    /// Returns an error if the TOML cannot be parsed into settings.
    pub fn from_toml_str(s: &str) -> Result<Self, DsError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DsError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Overrides the flatten mode from `NEXUSREL_FLATTEN_MODE` when it is set and valid.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_FLATTEN_MODE) {
            match raw.parse() {
                Ok(mode) => self.flatten_mode = mode,
                Err(e) => log::warn!("ignoring {ENV_FLATTEN_MODE}: {e}"),
            }
        }
        self
    }
}
