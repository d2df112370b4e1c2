//! # Training and Prediction Entry Points
//!
//! Thin orchestration over the core: read a training file, fit, persist, and
//! serve predictions from a [`ModelStore`]. Every entry point either succeeds
//! completely or returns a [`PricingError`]; there are no partial results.

use crate::config::ConfigError;
use crate::data::{DataError, RawTable, load_table};
use crate::estimate::EstimationError;
use crate::model::{ModelState, PredictionError, QuantileRegressor};
use crate::schema::{FeatureSchema, SchemaError};
use crate::store::{ModelStore, StorageError, save_state};
use crate::types::{PriceFeatures, PriceQuantiles, TrainingMetrics};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Top-level error for the pricing entry points.
#[derive(Error, Debug)]
pub enum PricingError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where a freshly trained model was written and how well it fits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub model_path: PathBuf,
    pub metrics: TrainingMetrics,
}

/// Rejects anything but a `.csv` training file.
fn check_training_file(csv_path: &Path) -> Result<(), DataError> {
    let is_csv = csv_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(())
    } else {
        Err(DataError::UnsupportedFileType(
            csv_path.display().to_string(),
        ))
    }
}

/// Fits a fresh model on the CSV at `csv_path`.
fn fit_csv(
    schema: &FeatureSchema,
    csv_path: &Path,
) -> Result<(Arc<ModelState>, TrainingMetrics), PricingError> {
    check_training_file(csv_path)?;
    let table = load_table(csv_path)?;

    let mut model = QuantileRegressor::untrained(schema.clone());
    let metrics = model.fit(&table)?;
    let state = model.state().ok_or(PredictionError::NotTrained)?;

    log::info!(
        "Trained on {} rows: MAE(p50) = {:.4}, pinball q10/q50/q90 = {:.4}/{:.4}/{:.4}",
        table.height(),
        metrics.mae_p50,
        metrics.pinball_loss_q10,
        metrics.pinball_loss_q50,
        metrics.pinball_loss_q90
    );
    Ok((state, metrics))
}

/// Fits a model on the CSV at `csv_path` and writes it to `model_path`.
///
/// The model file is only written after a successful fit.
pub fn train_and_save(
    schema: &FeatureSchema,
    csv_path: &Path,
    model_path: &Path,
) -> Result<TrainingReport, PricingError> {
    let (state, metrics) = fit_csv(schema, csv_path)?;
    save_state(&state, model_path)?;
    Ok(TrainingReport {
        model_path: model_path.to_path_buf(),
        metrics,
    })
}

/// Trains on `csv_path`, then persists the new state to the store's path and
/// serves it, as one step under the store's file lock.
///
/// The served model is exactly the one the returned metrics describe. If
/// training or saving fails, the store keeps serving its current model.
pub fn retrain(store: &ModelStore, csv_path: &Path) -> Result<TrainingReport, PricingError> {
    let schema = store.current().schema().clone();
    let (state, metrics) = fit_csv(&schema, csv_path)?;
    store.publish(state)?;
    Ok(TrainingReport {
        model_path: store.path().to_path_buf(),
        metrics,
    })
}

/// Prices typed request rows against the store's current model.
///
/// Every row is range-checked before anything is predicted.
pub fn predict_items(
    store: &ModelStore,
    items: &[PriceFeatures],
) -> Result<Vec<PriceQuantiles>, PricingError> {
    for (i, item) in items.iter().enumerate() {
        item.check_ranges(i + 1)?;
    }

    let model = store.current();
    if !model.is_trained() {
        return Err(PredictionError::NotTrained.into());
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }
    Ok(model.predict(&RawTable::from_features(items))?)
}

/// Prices every row of a raw table against the store's current model.
pub fn predict_table(
    store: &ModelStore,
    table: &RawTable,
) -> Result<Vec<PriceQuantiles>, PricingError> {
    Ok(store.current().predict(table)?)
}
