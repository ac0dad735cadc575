mod common;

use common::models;
use nexusrel::cli::{Command, load_models, resolve_options, run};
use nexusrel::config::{DatasourceOptions, FlattenMode};
use nexusrel::DsError;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn models_file() -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(serde_json::to_string(&models()).unwrap().as_bytes()).unwrap();
    f
}

fn output(cmd: Command, options: &DatasourceOptions) -> String {
    let mut out = Vec::new();
    run(cmd, options, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn models_load_from_json() {
    let f = models_file();
    let loaded = load_models(f.path()).unwrap();
    assert_eq!(loaded, models());
}

#[test]
fn collections_lists_columns_and_relations() {
    let f = models_file();
    let text = output(Command::Collections { models: f.path().to_path_buf() }, &DatasourceOptions::default());
    assert!(text.contains("owner_stores (virtual: owner.stores)"));
    assert!(text.contains("  engine@@@horsePower: Number"));
    assert!(text.contains("  _id: String pk"));
    assert!(text.contains("  tags: [String]"));
    assert!(text.contains("  storeId__manyToOne -> ManyToOne store"));
    assert!(text.contains("  stores -> OneToMany owner_stores"));
}

#[test]
fn compile_prints_the_pipeline() {
    let f = models_file();
    let request = r#"{
        "collection": "owner",
        "conditionTree": { "field": "storeId__manyToOne:name", "operator": "equal", "value": "A" },
        "projection": ["name"]
    }"#;
    let text = output(
        Command::Compile { models: f.path().to_path_buf(), request: request.to_string() },
        &DatasourceOptions::default(),
    );
    let stages: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    let names: Vec<_> = stages.iter().map(|s| s.as_object().unwrap().keys().next().unwrap().clone()).collect();
    assert_eq!(names, vec!["$lookup", "$unwind", "$match", "$project"]);
}

#[test]
fn compile_handles_aggregations() {
    let f = models_file();
    let request = r#"{
        "collection": "owner",
        "aggregation": { "operation": "Count", "groups": [ { "field": "name" } ] },
        "limit": 5
    }"#;
    let text = output(
        Command::Compile { models: f.path().to_path_buf(), request: request.to_string() },
        &DatasourceOptions::default(),
    );
    let stages: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(stages.len(), 4);
    assert!(stages[0].get("$group").is_some());
}

#[test]
fn compile_reports_bad_requests() {
    let f = models_file();
    let mut out = Vec::new();
    let cmd = Command::Compile { models: f.path().to_path_buf(), request: r#"{"collection": "garage"}"#.into() };
    assert!(matches!(run(cmd, &DatasourceOptions::default(), &mut out), Err(DsError::NoSuchCollection(_))));
    let cmd = Command::Compile { models: f.path().to_path_buf(), request: "{".into() };
    assert!(matches!(run(cmd, &DatasourceOptions::default(), &mut out), Err(DsError::Json(_))));
}

#[test]
fn missing_models_file_is_an_io_error() {
    let cmd = Command::Collections { models: PathBuf::from("/nonexistent/models.json") };
    let mut out = Vec::new();
    assert!(matches!(run(cmd, &DatasourceOptions::default(), &mut out), Err(DsError::Io(_))));
}

#[test]
fn flag_overrides_config_file() {
    let mut cfg = NamedTempFile::new().unwrap();
    cfg.write_all(b"flatten_mode = \"legacy\"\n[legacy_as_models]\nowner = [\"engine\"]\n").unwrap();
    let from_file = resolve_options(Some(cfg.path()), None).unwrap();
    if std::env::var(nexusrel::config::ENV_FLATTEN_MODE).is_err() {
        assert_eq!(from_file.flatten_mode, FlattenMode::Legacy);
    }
    assert_eq!(from_file.legacy_as_models["owner"], vec!["engine".to_string()]);

    let flagged = resolve_options(Some(cfg.path()), Some(FlattenMode::None)).unwrap();
    assert_eq!(flagged.flatten_mode, FlattenMode::None);
}
