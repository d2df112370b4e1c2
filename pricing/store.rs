//! # Model Persistence and the Current-Model Snapshot
//!
//! The trained state is written as a human-readable TOML record. Floats are
//! written in Rust's shortest round-trip form, so a loaded state is
//! bit-identical to the saved one.
//!
//! [`ModelStore`] owns the "current model" seen by concurrent readers. Readers
//! take an `Arc` snapshot and keep using it for as long as they hold it;
//! installing or reloading a model swaps the pointer atomically. A failed
//! reload leaves the previous snapshot in place.

use crate::design::DesignColumns;
use crate::model::{ModelState, QuantileRegressor};
use crate::schema::FeatureSchema;
use crate::types::Coefficients;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Custom error type for model saving and loading.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read or write model file '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model record is invalid: {0}")]
    InvalidRecord(String),
    #[error("There is no trained model to save.")]
    NothingToSave,
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The persisted form of a [`ModelState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub design_columns: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub resid_q10: f64,
    pub resid_q90: f64,
}

impl From<&ModelState> for ModelRecord {
    fn from(state: &ModelState) -> Self {
        Self {
            design_columns: state.design_columns().as_slice().to_vec(),
            coefficients: state.coefficients().to_vec(),
            intercept: state.intercept(),
            resid_q10: state.resid_q10(),
            resid_q90: state.resid_q90(),
        }
    }
}

impl TryFrom<ModelRecord> for ModelState {
    type Error = StorageError;

    fn try_from(record: ModelRecord) -> Result<Self, Self::Error> {
        let scalars = [
            ("intercept", record.intercept),
            ("resid_q10", record.resid_q10),
            ("resid_q90", record.resid_q90),
        ];
        if let Some((name, _)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StorageError::InvalidRecord(format!("'{name}' is not finite")));
        }
        if let Some(i) = record.coefficients.iter().position(|v| !v.is_finite()) {
            return Err(StorageError::InvalidRecord(format!(
                "coefficient {i} is not finite"
            )));
        }

        let columns = DesignColumns::new(record.design_columns)
            .map_err(|e| StorageError::InvalidRecord(e.to_string()))?;
        ModelState::new(
            columns,
            Coefficients::from(record.coefficients),
            record.intercept,
            record.resid_q10,
            record.resid_q90,
        )
        .map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }
}

/// Saves a trained state to `path` in TOML format.
///
/// The record is written to a uniquely named temporary file in the same
/// directory, synced, and renamed into place, so `path` always holds either
/// the previous record or the new one. The temporary file is removed if any
/// step fails.
pub fn save_state(state: &ModelState, path: &Path) -> Result<(), StorageError> {
    let toml_string = toml::to_string_pretty(&ModelRecord::from(state))?;

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut staging = NamedTempFile::new_in(parent).map_err(|e| StorageError::io(parent, e))?;
    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        writer
            .write_all(toml_string.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| StorageError::io(path, e))?;
    }
    staging
        .as_file()
        .sync_all()
        .map_err(|e| StorageError::io(path, e))?;
    staging
        .persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;

    log::info!("Model saved to '{}'", path.display());
    Ok(())
}

/// Loads and checks a trained state from a TOML file.
pub fn load_state(path: &Path) -> Result<ModelState, StorageError> {
    let toml_string = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    let record: ModelRecord = toml::from_str(&toml_string)?;
    let state = ModelState::try_from(record)?;
    log::info!(
        "Loaded model from '{}' with {} design columns",
        path.display(),
        state.design_columns().len()
    );
    Ok(state)
}

/// The model file plus the current-model snapshot shared by request handlers.
///
/// Readers never block. Writers that touch the file ([`save`](Self::save),
/// [`reload`](Self::reload), [`publish`](Self::publish)) are serialized so the
/// file and the served model always move together.
pub struct ModelStore {
    path: PathBuf,
    current: ArcSwap<QuantileRegressor>,
    file_lock: Mutex<()>,
}

impl ModelStore {
    /// A store at `path` with no model loaded.
    pub fn new(path: impl Into<PathBuf>, schema: FeatureSchema) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(QuantileRegressor::untrained(schema)),
            file_lock: Mutex::new(()),
        }
    }

    /// Loads the record at `path` if it exists; otherwise starts untrained.
    pub fn open(path: impl Into<PathBuf>, schema: FeatureSchema) -> Result<Self, StorageError> {
        let store = Self::new(path, schema);
        if store.path.exists() {
            store.reload()?;
        } else {
            log::info!(
                "No model at '{}'; starting untrained",
                store.path.display()
            );
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current model. The snapshot stays valid after later swaps.
    pub fn current(&self) -> Arc<QuantileRegressor> {
        self.current.load_full()
    }

    /// Atomically makes `model` the current model.
    pub fn install(&self, model: QuantileRegressor) {
        self.current.store(Arc::new(model));
    }

    fn lock_file(&self) -> std::sync::MutexGuard<'_, ()> {
        // The lock guards no data.
        self.file_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes the current model's state to the store's path.
    pub fn save(&self) -> Result<(), StorageError> {
        let _guard = self.lock_file();
        let state = self.current().state().ok_or(StorageError::NothingToSave)?;
        save_state(&state, &self.path)
    }

    /// Persists `state` to the store's path and makes it the current model.
    ///
    /// The served model is swapped only after the write succeeded, and the
    /// two steps run under the store's file lock, so concurrent publishers
    /// cannot leave the file and the served model disagreeing.
    pub fn publish(&self, state: Arc<ModelState>) -> Result<(), StorageError> {
        let _guard = self.lock_file();
        save_state(&state, &self.path)?;
        let schema = self.current().schema().clone();
        self.install(QuantileRegressor::from_state(schema, state));
        Ok(())
    }

    /// Reads the store's path and swaps the loaded state in.
    ///
    /// The record is fully read and checked before the swap; on any error the
    /// current model is left as it was.
    pub fn reload(&self) -> Result<Arc<ModelState>, StorageError> {
        let _guard = self.lock_file();
        let state = Arc::new(load_state(&self.path)?);
        let schema = self.current().schema().clone();
        self.install(QuantileRegressor::from_state(schema, Arc::clone(&state)));
        Ok(state)
    }
}
