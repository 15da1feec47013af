use std::fs;
use std::path::PathBuf;

use autowire_base::{AnalysisConfig, Config, ConfigSection, TracingConfig, config_section};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OutputConfig {
    directory: String,
    formats: Vec<String>,
}

#[config_section("emitter")]
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct EmitterSection {
    #[serde(default)]
    target: String,
    #[serde(default)]
    inline_hoisted: bool,
}

fn write_config(text: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), text).unwrap();
    file
}

#[tokio::test]
async fn test_config_new() {
    let config = Config::new();
    assert!(config.is_empty());
    assert_eq!(config.len(), 0);
}

#[tokio::test]
async fn test_config_set_and_get() {
    let mut config = Config::new();
    config
        .set(
            "output",
            OutputConfig {
                directory: "gen".into(),
                formats: vec!["json".into()],
            },
        )
        .unwrap();
    let output: OutputConfig = config.get("output").unwrap();
    assert_eq!(output.directory, "gen");
    assert_eq!(config.len(), 1);

    let missing: Option<OutputConfig> = config.get("missing").unwrap();
    assert!(missing.is_none());
    assert!(config.get::<OutputConfig>("missing").is_err());
}

#[tokio::test]
async fn test_config_with() {
    let config = Config::new().with("name", "app").with("pretty", true);
    assert_eq!(config.get::<String>("name").unwrap(), "app");
    assert!(config.get::<bool>("pretty").unwrap());
}

#[tokio::test]
async fn test_config_parse_invalid_json() {
    assert!(Config::parse("{ invalid").is_err());
}

#[tokio::test]
async fn test_config_parse_file() {
    let file = write_config(r#"{"analysis": {"graph_name": "service", "pretty": true}}"#);
    let config = Config::parse_file(file.path()).await.unwrap();
    let analysis: AnalysisConfig = config.section().unwrap();
    assert_eq!(analysis.graph_name.as_deref(), Some("service"));
    assert!(analysis.pretty);
    assert_eq!(analysis.reflections, None);

    assert!(Config::parse_file("/nonexistent/autowire.json").await.is_err());
}

#[tokio::test]
async fn test_config_merge() {
    let mut config = Config::parse(
        r#"
    {
        "output": {"directory": "gen", "formats": ["json"]},
        "analysis": {"graph_name": "app", "pretty": false}
    }
    "#,
    )
    .unwrap();
    let overrides = Config::parse(
        r#"
    {
        "output": {"formats": ["dot"]},
        "analysis": {"pretty": true},
        "tracing": {"level": "INFO"}
    }
    "#,
    )
    .unwrap();
    config.merge_from(overrides).unwrap();

    let output: OutputConfig = config.get("output").unwrap();
    assert_eq!(output.directory, "gen");
    assert_eq!(output.formats, vec!["json", "dot"]);

    let analysis: AnalysisConfig = config.section().unwrap();
    assert_eq!(analysis.graph_name.as_deref(), Some("app"));
    assert!(analysis.pretty);

    let tracing: TracingConfig = config.section().unwrap();
    assert_eq!(tracing.level, tracing::Level::INFO);
    assert_eq!(config.len(), 3);
}

#[tokio::test]
async fn test_config_merge_replace_primitives() {
    let mut config = Config::parse(r#"{"port": 8080, "name": "old"}"#).unwrap();
    config
        .merge_from(Config::parse(r#"{"port": 9090, "name": {"first": "new"}}"#).unwrap())
        .unwrap();
    assert_eq!(config.get::<u16>("port").unwrap(), 9090);
    assert_eq!(
        config.get::<serde_json::Value>("name").unwrap(),
        serde_json::json!({"first": "new"})
    );
}

#[tokio::test]
async fn test_config_load_with_overrides() {
    let base = write_config(r#"{"analysis": {"graph_name": "app"}, "tags": ["a"]}"#);
    let first = write_config(r#"{"analysis": {"pretty": true}, "tags": ["b"]}"#);
    let second = write_config(r#"{"analysis": {"reflections": "/var/reports"}}"#);
    let config = Config::load(
        Some(base.path()),
        &[first.path().to_owned(), second.path().to_owned()],
    )
    .await
    .unwrap();
    let analysis: AnalysisConfig = config.section().unwrap();
    assert_eq!(
        analysis,
        AnalysisConfig {
            graph_name: Some("app".into()),
            pretty: true,
            reflections: Some(PathBuf::from("/var/reports")),
        }
    );
    assert_eq!(config.get::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);

    let empty = Config::load(None, &[]).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_config_section_macro() {
    assert_eq!(EmitterSection::key(), "emitter");
    let config = Config::parse(r#"{"emitter": {"target": "rust", "inline_hoisted": true}}"#).unwrap();
    let section: EmitterSection = config.section().unwrap();
    assert_eq!(
        section,
        EmitterSection {
            target: "rust".into(),
            inline_hoisted: true,
        }
    );
    let section: EmitterSection = Config::new().section().unwrap();
    assert_eq!(section, EmitterSection::default());
}

#[tokio::test]
async fn test_builtin_section_keys() {
    assert_eq!(AnalysisConfig::key(), "analysis");
    assert_eq!(TracingConfig::key(), "tracing");
}
