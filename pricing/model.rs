use crate::data::{DataError, FeatureFrame, RawTable};
use crate::design::{DesignColumns, build_aligned_matrix};
use crate::estimate::{EstimationError, fit_model};
use crate::schema::{FeatureSchema, SchemaError};
use crate::types::{Coefficients, PriceQuantiles, TrainingMetrics};
use ndarray::{Array1, Array2};
use std::sync::Arc;
use thiserror::Error;

/// Raised when a state is assembled from parts that do not fit together.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("The model has {coefficients} coefficients for {columns} design columns.")]
pub struct StateMismatch {
    pub columns: usize,
    pub coefficients: usize,
}

/// Custom error type for prediction.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Model not trained yet: fit a model or load one before requesting predictions.")]
    NotTrained,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Data(#[from] DataError),
}

/// The complete trained state of the price model.
///
/// Created only by a successful fit or a successful load, and never modified
/// afterwards. Share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    design_columns: DesignColumns,
    coefficients: Coefficients,
    intercept: f64,
    resid_q10: f64,
    resid_q90: f64,
}

impl ModelState {
    pub fn new(
        design_columns: DesignColumns,
        coefficients: Coefficients,
        intercept: f64,
        resid_q10: f64,
        resid_q90: f64,
    ) -> Result<Self, StateMismatch> {
        if design_columns.len() != coefficients.len() {
            return Err(StateMismatch {
                columns: design_columns.len(),
                coefficients: coefficients.len(),
            });
        }
        Ok(Self {
            design_columns,
            coefficients,
            intercept,
            resid_q10,
            resid_q90,
        })
    }

    pub fn design_columns(&self) -> &DesignColumns {
        &self.design_columns
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn resid_q10(&self) -> f64 {
        self.resid_q10
    }

    pub fn resid_q90(&self) -> f64 {
        self.resid_q90
    }

    /// Whether the offsets bracket the point estimate, i.e. whether
    /// p10 <= p50 <= p90 holds for every prediction of this state.
    pub fn offsets_bracket_median(&self) -> bool {
        self.resid_q10 <= 0.0 && 0.0 <= self.resid_q90
    }

    /// Prices every row of an already coerced frame.
    pub fn predict_frame(&self, frame: &FeatureFrame) -> Vec<PriceQuantiles> {
        let aligned = build_aligned_matrix(&self.design_columns, frame);
        linear_predictor(&aligned.x, &self.coefficients, self.intercept)
            .iter()
            .map(|&point| PriceQuantiles::from_point(point, self.resid_q10, self.resid_q90))
            .collect()
    }
}

/// Point estimates `intercept + X . coefficients`.
///
/// Shared by the fit and predict paths so both produce bit-identical values
/// for the same rows.
pub fn linear_predictor(x: &Array2<f64>, coefficients: &Coefficients, intercept: f64) -> Array1<f64> {
    x.dot(&coefficients.as_view()).mapv_into(|v| intercept + v)
}

/// The price model: a schema plus an optional trained snapshot.
///
/// An untrained regressor is a valid value; it rejects predictions with
/// [`PredictionError::NotTrained`].
#[derive(Debug, Clone)]
pub struct QuantileRegressor {
    schema: FeatureSchema,
    state: Option<Arc<ModelState>>,
}

impl QuantileRegressor {
    pub fn untrained(schema: FeatureSchema) -> Self {
        Self {
            schema,
            state: None,
        }
    }

    pub fn from_state(schema: FeatureSchema, state: Arc<ModelState>) -> Self {
        Self {
            schema,
            state: Some(state),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    /// The current snapshot, if any. Holders keep it alive across refits.
    pub fn state(&self) -> Option<Arc<ModelState>> {
        self.state.clone()
    }

    /// Fits a new state on `table` and replaces the current one wholesale.
    ///
    /// On failure the previous state is kept. Snapshots handed out earlier by
    /// [`state`](Self::state) are never touched.
    pub fn fit(&mut self, table: &RawTable) -> Result<TrainingMetrics, EstimationError> {
        let outcome = fit_model(&self.schema, table)?;
        self.state = Some(Arc::new(outcome.state));
        Ok(outcome.metrics)
    }

    /// Prices every row of `table`, in input order. The target column is not needed.
    ///
    /// Either every row gets a result or the call fails.
    pub fn predict(&self, table: &RawTable) -> Result<Vec<PriceQuantiles>, PredictionError> {
        let state = self.state.as_ref().ok_or(PredictionError::NotTrained)?;
        let projected = self.schema.validate(table, false)?;
        let frame = FeatureFrame::from_table(&self.schema, &projected, false)?;
        Ok(state.predict_frame(&frame))
    }
}
