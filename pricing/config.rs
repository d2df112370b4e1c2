//! # Runtime Settings
//!
//! Settings come from three layers, later ones winning: built-in defaults, an
//! optional TOML file, and the `AGRIPRICE_MODEL_PATH` environment variable.
//! Command-line flags are applied on top by the binary.

use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides the configured model path.
pub const MODEL_PATH_ENV: &str = "AGRIPRICE_MODEL_PATH";

pub const DEFAULT_MODEL_PATH: &str = "models/model.toml";
pub const DEFAULT_TRAINING_CSV: &str = "data/demo_prices.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    TomlParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub model_path: PathBuf,
    pub training_csv: PathBuf,
    pub schema: FeatureSchema,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            training_csv: PathBuf::from(DEFAULT_TRAINING_CSV),
            schema: FeatureSchema::agricultural(),
        }
    }
}

impl Settings {
    /// Reads settings from `path` (or the defaults when `None`) and applies
    /// the environment override.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(settings.with_model_path_override(std::env::var_os(MODEL_PATH_ENV).map(PathBuf::from)))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            toml::from_str(&text).map_err(|source| ConfigError::TomlParseError {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("Loaded settings from '{}'", path.display());
        Ok(settings)
    }

    /// Replaces the model path when an override is present and non-empty.
    pub fn with_model_path_override(mut self, model_path: Option<PathBuf>) -> Self {
        if let Some(model_path) = model_path.filter(|p| !p.as_os_str().is_empty()) {
            log::debug!("Model path overridden to '{}'", model_path.display());
            self.model_path = model_path;
        }
        self
    }
}
