//! Resolving fixture content with a configuration loaded from TOML

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use flowview::{ConfigError, EngineConfig, JsonModel, Services, ViewBuilder};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_json(name: &str) -> Value {
    let source = fs::read_to_string(fixture(name)).expect("Should read fixture");
    serde_json::from_str(&source).expect("Should parse fixture")
}

#[test]
fn test_config_file_overrides_defaults() {
    let config = EngineConfig::from_file(fixture("engine.toml")).expect("Should load config");

    assert_eq!(config.properties_to_skip, vec!["exp", "note"]);
    assert_eq!(config.index_placeholder_at(0), "_item_");
    assert_eq!(config.max_async_rounds, 4);
    assert_eq!(config.max_before_resolve_rounds, 32);
}

#[test]
fn test_missing_config_file() {
    let result = EngineConfig::from_file(fixture("missing.toml"));
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}

#[test]
fn test_survey_fixture_resolves_with_config() {
    let config = EngineConfig::from_file(fixture("engine.toml")).expect("Should load config");
    let model = Rc::new(JsonModel::new(json!({
        "user": {"name": "Ada"},
        "questions": [{"label": "Age"}, {"label": "City"}]
    })));

    let mut view = ViewBuilder::new(Services::with_model(model))
        .with_config(config)
        .build(&load_json("survey.json"))
        .expect("Should build view");
    let output = view
        .run_until_idle()
        .expect("Should resolve")
        .expect("Should produce output");

    let title = &output["title"]["asset"];
    assert_eq!(title["value"], json!("Questions for Ada"));
    assert_eq!(title["note"], json!("shown as {{user.name}}"));

    insta::assert_snapshot!(
        output["questions"].to_string(),
        @r#"[{"asset":{"id":"question-0","type":"input","label":"Age"}},{"asset":{"id":"question-1","type":"input","label":"City"}}]"#
    );
}
