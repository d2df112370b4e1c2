// pricing/estimate.rs

//! # Model Estimation via Least Squares and Residual Quantiles
//!
//! This module fits the price model. The procedure is non-iterative:
//!
//! 1.  **Point model:** an intercept plus one coefficient per design column,
//!     found by ordinary least squares. One-hot encoding together with an
//!     intercept is rank-deficient by construction (every categorical field
//!     contributes one exact collinearity), so the solve goes through a
//!     truncated singular value decomposition and returns the minimum-norm
//!     solution instead of failing.
//!
//! 2.  **Interval model:** the empirical 10th and 90th percentiles of the
//!     in-sample residuals become additive offsets around the point estimate.
//!
//! The in-sample pinball losses at τ = 0.1, 0.5, 0.9 are reported so a caller
//! can judge how well those offsets bracket the training targets.

use crate::data::{DataError, FeatureFrame, RawTable};
use crate::design::build_fit_matrix;
use crate::model::{ModelState, StateMismatch, linear_predictor};
use crate::schema::{FeatureSchema, SchemaError};
use crate::types::{Coefficients, TrainingMetrics};

use ndarray::{Array1, Array2, ArrayView1, s};
use ndarray_linalg::error::LinalgError;
use thiserror::Error;

pub const LOWER_QUANTILE: f64 = 0.10;
pub const MEDIAN_QUANTILE: f64 = 0.50;
pub const UPPER_QUANTILE: f64 = 0.90;

/// A comprehensive error type for the model estimation process.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("The least-squares solve failed during singular value decomposition: {0}")]
    LinearSystemSolveFailed(#[from] LinalgError),

    #[error("The singular value decomposition did not return singular vectors.")]
    MissingSingularVectors,

    #[error("The least-squares solution contains non-finite values.")]
    NonFiniteSolution,

    #[error("An internal error occurred while assembling the fitted state: {0}")]
    StateAssembly(#[from] StateMismatch),
}

/// A freshly fitted model state and its in-sample metrics.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub state: ModelState,
    pub metrics: TrainingMetrics,
}

/// The main entry point for model training.
///
/// Validates `table` against `schema` (target required), builds the fit-mode
/// design matrix, solves for the coefficients and derives the residual
/// offsets. Produces a new state; nothing existing is modified.
pub fn fit_model(schema: &FeatureSchema, table: &RawTable) -> Result<FitOutcome, EstimationError> {
    let projected = schema.validate(table, true)?;
    let frame = FeatureFrame::from_table(schema, &projected, true)?;
    let y = frame
        .target
        .as_ref()
        .ok_or_else(|| DataError::ColumnNotFound(schema.target().to_string()))?;

    log::info!("Starting model training. {} total rows.", frame.n_rows());

    // 1. Design matrix with a leading intercept column.
    let design = build_fit_matrix(&frame)?;
    let x_ext = internal::with_intercept(&design.x);

    // 2. Minimum-norm least squares.
    let (beta, rank) = internal::solve_least_squares(&x_ext, y)?;
    log::info!(
        "Least-squares solve: {} parameters, effective rank {}.",
        x_ext.ncols(),
        rank
    );

    let intercept = beta[0];
    let coefficients = Coefficients::new(beta.slice(s![1..]).to_owned());

    // 3. Residual offsets.
    let fitted = linear_predictor(&design.x, &coefficients, intercept);
    let residuals = y - &fitted;
    let resid_q10 = empirical_quantile(residuals.view(), LOWER_QUANTILE);
    let resid_q90 = empirical_quantile(residuals.view(), UPPER_QUANTILE);

    // 4. In-sample metrics.
    let metrics = TrainingMetrics {
        mae_p50: residuals.mapv(f64::abs).mean().unwrap_or(0.0),
        pinball_loss_q10: pinball_loss(y.view(), (&fitted + resid_q10).view(), LOWER_QUANTILE),
        pinball_loss_q50: pinball_loss(y.view(), fitted.view(), MEDIAN_QUANTILE),
        pinball_loss_q90: pinball_loss(y.view(), (&fitted + resid_q90).view(), UPPER_QUANTILE),
    };

    if resid_q10 > 0.0 || resid_q90 < 0.0 {
        log::warn!(
            "Residual offsets do not bracket zero (q10 = {resid_q10:.6}, q90 = {resid_q90:.6}); \
             p10 <= p50 <= p90 will not hold for every prediction."
        );
    }
    log::info!(
        "Training complete. MAE(p50) = {:.6}, pinball q10/q50/q90 = {:.6}/{:.6}/{:.6}",
        metrics.mae_p50,
        metrics.pinball_loss_q10,
        metrics.pinball_loss_q50,
        metrics.pinball_loss_q90
    );

    let state = ModelState::new(design.columns, coefficients, intercept, resid_q10, resid_q90)?;
    Ok(FitOutcome { state, metrics })
}

/// The `q`-th empirical quantile with linear interpolation between order
/// statistics. Returns NaN for an empty input.
pub fn empirical_quantile(values: ArrayView1<f64>, q: f64) -> f64 {
    let mut sorted = values.to_vec();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Mean pinball (quantile) loss of `y_pred` against `y_true` at quantile `tau`.
pub fn pinball_loss(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>, tau: f64) -> f64 {
    let losses = ndarray::Zip::from(&y_true)
        .and(&y_pred)
        .map_collect(|&y, &p| {
            let diff = y - p;
            if diff >= 0.0 {
                tau * diff
            } else {
                (tau - 1.0) * diff
            }
        });
    losses.mean().unwrap_or(0.0)
}

/// Internal module for estimation implementation details.
mod internal {
    use super::*;
    use ndarray_linalg::{JobSvd, SVDDC};

    /// Prepends a column of ones to `x`.
    pub(super) fn with_intercept(x: &Array2<f64>) -> Array2<f64> {
        let mut extended = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
        extended.slice_mut(s![.., 1..]).assign(x);
        extended
    }

    /// Solves `min ||y - X beta||` through a thin SVD, zeroing singular values
    /// below `eps * max(n, p) * sigma_max`. Returns the minimum-norm solution
    /// and the effective rank.
    pub(super) fn solve_least_squares(
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array1<f64>, usize), EstimationError> {
        let (u, sigma, vt) = x.svddc(JobSvd::Some)?;
        let (Some(u), Some(vt)) = (u, vt) else {
            return Err(EstimationError::MissingSingularVectors);
        };

        let sigma_max = sigma.iter().fold(0.0_f64, |acc, &v| acc.max(v));
        let tolerance = f64::EPSILON * x.nrows().max(x.ncols()) as f64 * sigma_max;

        let uty = u.t().dot(y);
        let mut beta = Array1::<f64>::zeros(x.ncols());
        let mut rank = 0;
        for (i, &sv) in sigma.iter().enumerate() {
            if sv > tolerance {
                beta.scaled_add(uty[i] / sv, &vt.row(i));
                rank += 1;
            }
        }

        if beta.iter().any(|v| !v.is_finite()) {
            log::error!("Non-finite least-squares solution: {beta:?}");
            return Err(EstimationError::NonFiniteSolution);
        }
        Ok((beta, rank))
    }
}
