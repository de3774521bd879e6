//! Engine configuration
//!
//! Tunables can be set in code through the `with_*` builders or loaded from a
//! TOML file:
//!
//! ```toml
//! [strings]
//! properties_to_skip = ["exp", "validation"]
//!
//! [templates]
//! index_placeholder = "_index"
//!
//! [resolver]
//! max_before_resolve_rounds = 32
//!
//! [async]
//! max_rounds = 16
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Configuration shared by the parser, resolver and built-in plugins
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Asset properties string interpolation leaves alone unless the asset
    /// carries its own list
    pub properties_to_skip: Vec<String>,
    /// Prefix of the template index placeholder (`_index_`, `_index1_`, ...)
    pub index_placeholder: String,
    /// Restarts of the before-resolve pipeline allowed per node
    pub max_before_resolve_rounds: usize,
    /// Passes [`crate::View::run_until_idle`] runs while async work keeps
    /// requesting updates
    pub max_async_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            properties_to_skip: vec!["exp".to_string()],
            index_placeholder: "_index".to_string(),
            max_before_resolve_rounds: 32,
            max_async_rounds: 16,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TomlConfig {
    strings: TomlStrings,
    templates: TomlTemplates,
    resolver: TomlResolver,
    #[serde(rename = "async")]
    async_: TomlAsync,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TomlStrings {
    properties_to_skip: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TomlTemplates {
    index_placeholder: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TomlResolver {
    max_before_resolve_rounds: Option<usize>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TomlAsync {
    max_rounds: Option<usize>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties_to_skip<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties_to_skip = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_index_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.index_placeholder = placeholder.into();
        self
    }

    pub fn with_max_before_resolve_rounds(mut self, rounds: usize) -> Self {
        self.max_before_resolve_rounds = rounds;
        self
    }

    pub fn with_max_async_rounds(mut self, rounds: usize) -> Self {
        self.max_async_rounds = rounds;
        self
    }

    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse from a TOML string. Missing keys keep their defaults.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let defaults = Self::default();

        Ok(Self {
            properties_to_skip: parsed
                .strings
                .properties_to_skip
                .unwrap_or(defaults.properties_to_skip),
            index_placeholder: parsed
                .templates
                .index_placeholder
                .unwrap_or(defaults.index_placeholder),
            max_before_resolve_rounds: parsed
                .resolver
                .max_before_resolve_rounds
                .unwrap_or(defaults.max_before_resolve_rounds),
            max_async_rounds: parsed
                .async_
                .max_rounds
                .unwrap_or(defaults.max_async_rounds),
        })
    }

    /// The placeholder for a template nested `depth` levels deep
    pub fn index_placeholder_at(&self, depth: usize) -> String {
        if depth == 0 {
            format!("{}_", self.index_placeholder)
        } else {
            format!("{}{}_", self.index_placeholder, depth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.properties_to_skip, vec!["exp".to_string()]);
        assert_eq!(config.index_placeholder, "_index");
        assert_eq!(config.max_before_resolve_rounds, 32);
        assert_eq!(config.max_async_rounds, 16);
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_properties_to_skip(["exp", "validation"])
            .with_index_placeholder("_i")
            .with_max_before_resolve_rounds(4)
            .with_max_async_rounds(2);

        assert_eq!(config.properties_to_skip, vec!["exp", "validation"]);
        assert_eq!(config.index_placeholder_at(0), "_i_");
        assert_eq!(config.max_before_resolve_rounds, 4);
        assert_eq!(config.max_async_rounds, 2);
    }

    #[test]
    fn test_index_placeholder_depth() {
        let config = EngineConfig::default();
        assert_eq!(config.index_placeholder_at(0), "_index_");
        assert_eq!(config.index_placeholder_at(1), "_index1_");
        assert_eq!(config.index_placeholder_at(2), "_index2_");
    }

    #[test]
    fn test_from_str_partial() {
        let config = EngineConfig::from_str(
            r#"
            [strings]
            properties_to_skip = ["exp", "label"]

            [async]
            max_rounds = 3
            "#,
        )
        .expect("Should parse config");

        assert_eq!(config.properties_to_skip, vec!["exp", "label"]);
        assert_eq!(config.max_async_rounds, 3);
        assert_eq!(config.index_placeholder, "_index");
        assert_eq!(config.max_before_resolve_rounds, 32);
    }

    #[test]
    fn test_from_str_empty_is_default() {
        let config = EngineConfig::from_str("").expect("Should parse empty config");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_from_str_invalid() {
        let result = EngineConfig::from_str("[resolver]\nmax_before_resolve_rounds = \"lots\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
