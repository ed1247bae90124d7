//! Configuration loading.
//!
//! A single YAML document drives the whole tool. The `model` section is read
//! into [`ModelConfig`], the record the inference wrapper is built from. The
//! optional `logging` and `models` sections are read into [`RuntimeSettings`]
//! through [`load_raw`], since they sit outside the model schema.
//!
//! ```yaml
//! model:
//!   name: TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF
//!   max_length: 100
//!   batch_size: 1
//!   device: cpu
//!   quantization:
//!     variant: Q4_K_M
//! logging:
//!   level: info
//!   directory: logs
//! models:
//!   directory: models
//! ```

mod quantization;

pub use ::config::ConfigError;
pub use quantization::QuantizationOptions;

use ::config::{Config, File, FileFormat};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Model settings, read from the `model` section of the configuration file.
///
/// Once built the record is never mutated; the wrapper shares it through an `Arc`.
/// Keys outside the five fields below are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model identifier on the model hub, or a local path to weights
    pub name: String,
    /// Upper bound on the total token count of a generation
    pub max_length: usize,
    /// Declared batch size; single-prompt generation does not use it
    pub batch_size: usize,
    /// Compute target handed to the backend ("cpu", "cuda", "cuda:0", ...)
    pub device: String,
    /// Backend-specific quantization options, kept verbatim
    #[serde(deserialize_with = "empty_map_if_null")]
    pub quantization: BTreeMap<String, Value>,
}

/// The `config` crate collapses an empty table (`quantization: {}`) to null,
/// so null is read as an empty mapping. The key itself is still required.
fn empty_map_if_null<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ModelConfig {
    /// Reads the `model` section of a YAML configuration file.
    ///
    /// Fails when the file is absent or is not valid YAML. Also fails when a
    /// required field is missing or mistyped, or an unknown field is present.
    /// Keys are case-sensitive.
    pub fn from_source<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = build(path.as_ref())?;
        let model = settings.get::<ModelConfig>("model")?;
        debug!(name = %model.name, device = %model.device, "Model configuration loaded");
        Ok(model)
    }

    /// Whether `device` names a GPU rather than the CPU.
    pub fn uses_gpu(&self) -> bool {
        let device = self.device.trim().to_lowercase();
        device.starts_with("cuda")
            || device.starts_with("gpu")
            || device.starts_with("vulkan")
            || device == "metal"
            || device == "mps"
    }

    /// Typed view of the opaque `quantization` mapping.
    pub fn quantization_options(&self) -> QuantizationOptions {
        QuantizationOptions::from_map(&self.quantization)
    }
}

/// Returns the full parsed document, including sections outside [`ModelConfig`].
pub fn load_raw<P: AsRef<Path>>(path: P) -> Result<Map<String, Value>, ConfigError> {
    build(path.as_ref())?.try_deserialize::<Map<String, Value>>()
}

fn build(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Message(format!(
            "Configuration file not found at: {}",
            path.display()
        )));
    }

    Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml).required(true))
        .build()
}

/// Logging settings from the optional `logging` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Directory the rolling log files are written to
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

/// Local model cache settings from the optional `models` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    /// Root of the local model cache
    pub directory: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("models"),
        }
    }
}

/// Settings for the command line tool that live beside the model section.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RuntimeSettings {
    pub logging: LoggingConfig,
    pub models: ModelsConfig,
}

impl RuntimeSettings {
    /// Extracts the runtime sections from a document returned by [`load_raw`].
    /// Absent sections fall back to their defaults.
    pub fn from_raw(raw: &Map<String, Value>) -> Result<Self, ConfigError> {
        let settings: RuntimeSettings = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| ConfigError::Message(format!("Invalid runtime settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(format!(
                "Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                self.logging.level
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_device(device: &str) -> ModelConfig {
        ModelConfig {
            name: "dummy-model".to_string(),
            max_length: 50,
            batch_size: 1,
            device: device.to_string(),
            quantization: BTreeMap::new(),
        }
    }

    #[test]
    fn test_uses_gpu() {
        assert!(!config_with_device("cpu").uses_gpu());
        assert!(!config_with_device("CPU").uses_gpu());
        assert!(config_with_device("cuda").uses_gpu());
        assert!(config_with_device("cuda:1").uses_gpu());
        assert!(config_with_device("metal").uses_gpu());
    }

    #[test]
    fn test_runtime_settings_defaults() {
        let settings = RuntimeSettings::from_raw(&Map::new()).unwrap();
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.directory, PathBuf::from("logs"));
        assert_eq!(settings.models.directory, PathBuf::from("models"));
    }

    #[test]
    fn test_runtime_settings_rejects_unknown_level() {
        let raw = serde_json::json!({ "logging": { "level": "loud" } });
        let raw = raw.as_object().unwrap();
        let result = RuntimeSettings::from_raw(raw);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid logging level"));
    }

    #[test]
    fn test_runtime_settings_ignores_model_section() {
        let raw = serde_json::json!({
            "model": { "name": "x" },
            "models": { "directory": "/var/cache/models" }
        });
        let settings = RuntimeSettings::from_raw(raw.as_object().unwrap()).unwrap();
        assert_eq!(settings.models.directory, PathBuf::from("/var/cache/models"));
    }
}
