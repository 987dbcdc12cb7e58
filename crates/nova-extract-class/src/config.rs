//! Engine configuration (`extract-class.toml`).

use std::path::Path;
use std::sync::{Once, OnceLock};

use schemars::schema::RootSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::validate::DEFAULT_MAX_REPAIR_ITERATIONS;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IndentStyle {
    #[default]
    Spaces,
    Tabs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractClassConfig {
    /// Upper bound on auto-repair passes before a candidate set is rejected.
    #[serde(default = "default_max_repair_iterations")]
    #[schemars(range(min = 1))]
    pub max_repair_iterations: usize,

    /// Name of the field holding the new class instance. Defaults to the new class name in
    /// lower camel case.
    #[serde(default)]
    pub helper_field_name: Option<String>,

    #[serde(default = "default_indent_width")]
    pub indent_width: usize,

    #[serde(default)]
    pub indent_style: IndentStyle,

    /// Extension of the generated file. Defaults to the original file's extension.
    #[serde(default)]
    pub file_extension: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_repair_iterations() -> usize {
    DEFAULT_MAX_REPAIR_ITERATIONS
}

fn default_indent_width() -> usize {
    4
}

impl Default for ExtractClassConfig {
    fn default() -> Self {
        Self {
            max_repair_iterations: default_max_repair_iterations(),
            helper_field_name: None,
            indent_width: default_indent_width(),
            indent_style: IndentStyle::default(),
            file_extension: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ExtractClassConfig {
    /// One level of indentation.
    pub fn indent_unit(&self) -> String {
        match self.indent_style {
            IndentStyle::Spaces => " ".repeat(self.indent_width),
            IndentStyle::Tabs => "\t".to_string(),
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// JSON schema for the config file.
#[must_use]
pub fn json_schema() -> RootSchema {
    schema_for!(ExtractClassConfig)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
        })
    }

    /// The effective filter: the configured level, with `RUST_LOG` merged in when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);
        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber for the process. Later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed()
        };

        // Another subscriber may already be installed (e.g. by an embedding binary).
        let _ = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer)
            .try_init();
    });
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a snippet of the input; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED_STRING_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    let re = QUOTED_STRING_RE.get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*""#).ok());
    match re {
        Some(re) => re.replace_all(message, r#""<redacted>""#).into_owned(),
        None => message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_an_empty_file() {
        let config = ExtractClassConfig::load_from_str("").unwrap();
        assert_eq!(config, ExtractClassConfig::default());
        assert_eq!(config.max_repair_iterations, 10);
        assert_eq!(config.indent_unit(), "    ");
    }

    #[test]
    fn reads_every_key() {
        let config = ExtractClassConfig::load_from_str(
            r#"
max_repair_iterations = 3
helper_field_name = "delegate"
indent_style = "tabs"
file_extension = "jav"

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();
        assert_eq!(config.max_repair_iterations, 3);
        assert_eq!(config.helper_field_name.as_deref(), Some("delegate"));
        assert_eq!(config.indent_unit(), "\t");
        assert_eq!(config.file_extension.as_deref(), Some("jav"));
        assert!(config.logging.json);
    }

    #[test]
    fn toml_errors_do_not_echo_values() {
        let err = ExtractClassConfig::load_from_str("helper_field_name = 3\nsecret = \"hunter2\"\n")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("failed to parse toml config"), "{message}");
        assert!(!message.contains("hunter2"), "{message}");
    }

    #[test]
    fn schema_names_the_config() {
        let schema = serde_json::to_value(json_schema()).unwrap();
        assert_eq!(schema["title"], "ExtractClassConfig");
        assert!(schema["properties"]["max_repair_iterations"].is_object());
    }
}
