//! Decides, per model, which nested paths are flattened onto their parent and which are
//! promoted into virtual collections.

use crate::config::{DatasourceOptions, FlattenMode, ModelFlatten};
use crate::errors::DsError;
use crate::schema::{ModelSchema, SchemaNode, SchemaRegistry, Stack, StackEntry};
use crate::utils::paths::{ancestors, depth, is_within, strip_prefix};
use std::collections::BTreeMap;

/// Paths of one model to flatten (`as_fields`) or promote (`as_models`).
///
/// Both lists are sorted and deduplicated so parents come before children; a path listed
/// in both only stays in `as_models`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenOptions {
    pub as_fields: Vec<String>,
    pub as_models: Vec<String>,
}

impl FlattenOptions {
    #[must_use]
    pub fn new(mut as_fields: Vec<String>, mut as_models: Vec<String>) -> Self {
        as_models.sort();
        as_models.dedup();
        as_fields.sort();
        as_fields.dedup();
        as_fields.retain(|f| as_models.binary_search(f).is_err());
        Self { as_fields, as_models }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_fields.is_empty() && self.as_models.is_empty()
    }

    /// Stack entry of the boundary at `prefix` (`None` is the physical root): the paths
    /// below it, made relative, minus those owned by a deeper promotion boundary.
    #[must_use]
    pub fn entry(&self, prefix: Option<&str>) -> StackEntry {
        let below = |p: &str| prefix.is_none_or(|pre| strip_prefix(p, pre).is_some());
        let owned_deeper =
            |p: &str| self.as_models.iter().any(|m| below(m.as_str()) && strip_prefix(p, m).is_some());
        let select = |paths: &[String]| -> Vec<String> {
            paths
                .iter()
                .map(String::as_str)
                .filter(|p| below(*p) && !owned_deeper(*p))
                .map(|p| prefix.and_then(|pre| strip_prefix(p, pre)).unwrap_or(p).to_string())
                .collect()
        };

        StackEntry {
            prefix: prefix.map(str::to_string),
            as_fields: select(&self.as_fields),
            as_models: select(&self.as_models),
        }
    }

    /// Every boundary crossed from the physical root down to the collection promoted at
    /// `prefix`, identity entry first.
    #[must_use]
    pub fn stack_for(&self, prefix: Option<&str>) -> Stack {
        let mut stack = vec![self.entry(None)];
        if let Some(target) = prefix {
            stack.extend(
                self.as_models
                    .iter()
                    .filter(|m| is_within(target, m.as_str()))
                    .map(|m| self.entry(Some(m))),
            );
        }
        stack
    }
}

/// Runs the configured policy for every model of the registry.
///
/// # Errors
/// Fails when settings name an unknown model or a manual path is invalid.
pub fn plan_all(
    registry: &SchemaRegistry,
    options: &DatasourceOptions,
) -> Result<BTreeMap<String, FlattenOptions>, DsError> {
    let configured = options.flatten_options.keys().chain(options.legacy_as_models.keys());
    for name in configured {
        if !registry.contains(name) {
            return Err(DsError::UnknownModel(name.clone()));
        }
    }
    registry
        .names()
        .map(|name| Ok((name.to_string(), plan(&registry.model(name)?, options)?)))
        .collect()
}

/// Runs the configured policy for one model.
///
/// # Errors
/// Fails when a manual or legacy path does not exist or crosses an array.
pub fn plan(schema: &ModelSchema<'_>, options: &DatasourceOptions) -> Result<FlattenOptions, DsError> {
    let name = schema.model_name();
    let planned = match options.flatten_mode {
        FlattenMode::Auto => plan_auto(schema),
        FlattenMode::Manual => {
            let empty = ModelFlatten::default();
            plan_manual(schema, options.flatten_options.get(name).unwrap_or(&empty))?
        }
        FlattenMode::None => FlattenOptions::default(),
        FlattenMode::Legacy => {
            plan_legacy(schema, options.legacy_as_models.get(name).map_or(&[][..], Vec::as_slice))?
        }
    };
    if !planned.is_empty() {
        log::debug!(
            "{name}: {} flattened, {} promoted ({:?})",
            planned.as_fields.len(),
            planned.as_models.len(),
            options.flatten_mode
        );
    }
    Ok(planned)
}

fn is_promotable(node: &SchemaNode) -> bool {
    node.is_array()
        && match node.element() {
            SchemaNode::Leaf(leaf) => leaf.reference_to.is_some(),
            _ => true,
        }
}

fn plan_auto(schema: &ModelSchema<'_>) -> FlattenOptions {
    let as_models = schema.list_paths_matching(|_, node| is_promotable(node));
    let as_fields = schema.list_paths_matching(|path, node| {
        if !node.is_leaf() || as_models.iter().any(|m| m == path) {
            return false;
        }
        let nearest = as_models
            .iter()
            .filter(|m| strip_prefix(path, m).is_some())
            .map(|m| depth(Some(path)) - depth(Some(m.as_str())))
            .chain(std::iter::once(depth(Some(path))))
            .min()
            .unwrap_or(0);
        nearest > 1
    });
    FlattenOptions::new(as_fields, as_models)
}

fn plan_manual(schema: &ModelSchema<'_>, cfg: &ModelFlatten) -> Result<FlattenOptions, DsError> {
    let root = schema.node();
    let invalid = |path: &str, reason: &str| DsError::InvalidFlattenPath {
        model: schema.model_name().to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    };
    for path in cfg.as_fields.iter().chain(&cfg.as_models) {
        if root.get(path).is_none() {
            return Err(invalid(path, "no such path"));
        }
    }
    for path in cfg.as_fields.iter().chain(&cfg.as_models) {
        let crossed = ancestors(path)
            .find(|a| schema.is_array_at(a) && !cfg.as_models.iter().any(|m| m == a));
        if let Some(array) = crossed {
            return Err(invalid(path, &format!("crosses the array '{array}'")));
        }
    }
    Ok(FlattenOptions::new(cfg.as_fields.clone(), cfg.as_models.clone()))
}

fn plan_legacy(schema: &ModelSchema<'_>, cuts: &[String]) -> Result<FlattenOptions, DsError> {
    let mut as_models = Vec::new();
    for cut in cuts {
        if schema.node().get(cut).is_none() {
            return Err(DsError::InvalidFlattenPath {
                model: schema.model_name().to_string(),
                path: cut.clone(),
                reason: "no such path".into(),
            });
        }
        as_models.extend(ancestors(cut).map(str::to_string));
        as_models.push(cut.clone());
    }
    Ok(FlattenOptions::new(Vec::new(), as_models))
}
