//! Programmatic side of the `nexusrel` binary: inspect the synthesized graph and print the
//! pipelines requests compile to.

use crate::config::{DatasourceOptions, FlattenMode};
use crate::errors::DsError;
use crate::pipeline::{PipelineCompiler, to_documents};
use crate::query::parse_request_json;
use crate::relation::{CollectionDef, ColumnType, RelationGraph};
use crate::schema::NativeModel;
use std::io::Write;
use std::path::{Path, PathBuf};

pub enum Command {
    /// Every collection of the graph with its columns and relations.
    Collections { models: PathBuf },
    /// The pipeline a JSON request compiles to.
    Compile { models: PathBuf, request: String },
}

/// Reads model descriptions from a JSON array.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a list of models.
pub fn load_models(path: &Path) -> Result<Vec<NativeModel>, DsError> {
    let s = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&s)?)
}

/// Settings with precedence flag > environment > file > defaults.
///
/// # Errors
/// Returns an error if the configuration file is given but unreadable.
pub fn resolve_options(config: Option<&Path>, mode: Option<FlattenMode>) -> Result<DatasourceOptions, DsError> {
    let mut options = match config {
        Some(path) => DatasourceOptions::load(path)?,
        None => DatasourceOptions::default(),
    }
    .apply_env();
    if let Some(mode) = mode {
        options.flatten_mode = mode;
    }
    Ok(options)
}

/// # Errors
/// Configuration, parse and compilation errors, and failures writing to `out`.
pub fn run(cmd: Command, options: &DatasourceOptions, out: &mut impl Write) -> Result<(), DsError> {
    match cmd {
        Command::Collections { models } => {
            let graph = RelationGraph::from_models(&load_models(&models)?, options)?;
            for def in graph.iter() {
                describe(def, out)?;
            }
        }
        Command::Compile { models, request } => {
            let graph = RelationGraph::from_models(&load_models(&models)?, options)?;
            let request = parse_request_json(&request)?;
            let compiler = PipelineCompiler::new(&graph, &request.collection)?;
            let stages = match &request.aggregation {
                Some(aggregation) => {
                    compiler.aggregate(request.filter.condition_tree.as_ref(), aggregation, request.limit)?
                }
                None => compiler.list(&request.filter, &request.projection)?,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&to_documents(&stages))?)?;
        }
    }
    Ok(())
}

fn describe(def: &CollectionDef, out: &mut impl Write) -> Result<(), DsError> {
    match &def.prefix {
        Some(prefix) => writeln!(out, "{} (virtual: {}.{prefix})", def.name, def.model)?,
        None => writeln!(out, "{}", def.name)?,
    }
    for (name, column) in &def.schema.columns {
        let kind = match &column.column_type {
            ColumnType::Primitive(t) => format!("{t:?}"),
            ColumnType::Array(inner) => {
                format!("[{}]", inner.native_type().map_or_else(|| "Object".to_string(), |t| format!("{t:?}")))
            }
            ColumnType::Object(_) => "Object".to_string(),
        };
        let flags = if column.is_primary_key { " pk" } else if column.is_read_only { " ro" } else { "" };
        writeln!(out, "  {name}: {kind}{flags}")?;
    }
    for (name, relation) in &def.schema.relations {
        writeln!(out, "  {name} -> {} {}", relation.kind(), relation.foreign_collection())?;
    }
    Ok(())
}
