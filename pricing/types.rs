use crate::data::DataError;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Fitted coefficients, one per design column, excluding the intercept.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn as_view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for Coefficients {
    fn from(values: Vec<f64>) -> Self {
        Self(Array1::from_vec(values))
    }
}

/// One commodity lot to price, with the agricultural schema's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFeatures {
    pub product_category: String,
    pub variety: String,
    pub market_region: String,
    pub grade: String,

    pub quantity_kg: f64,
    pub moisture_pct: f64,
    pub days_since_harvest: f64,
    pub historical_avg_price: f64,
}

impl PriceFeatures {
    /// Checks the physical bounds of the numeric fields. `row` is 1-based and
    /// only used to label the error.
    pub fn check_ranges(&self, row: usize) -> Result<(), DataError> {
        let checks: [(&'static str, f64, &'static str, bool); 4] = [
            (
                "quantity_kg",
                self.quantity_kg,
                ">= 0",
                self.quantity_kg >= 0.0,
            ),
            (
                "moisture_pct",
                self.moisture_pct,
                "between 0 and 100",
                (0.0..=100.0).contains(&self.moisture_pct),
            ),
            (
                "days_since_harvest",
                self.days_since_harvest,
                ">= 0",
                self.days_since_harvest >= 0.0,
            ),
            (
                "historical_avg_price",
                self.historical_avg_price,
                ">= 0",
                self.historical_avg_price >= 0.0,
            ),
        ];

        for (field, value, bounds, ok) in checks {
            if !ok {
                return Err(DataError::OutOfRange {
                    row,
                    field,
                    value,
                    bounds,
                });
            }
        }
        Ok(())
    }
}

/// The price band suggested for one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuantiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    /// `p50` floored at zero.
    pub suggested_price: f64,
}

impl PriceQuantiles {
    pub fn from_point(point: f64, resid_q10: f64, resid_q90: f64) -> Self {
        Self {
            p10: point + resid_q10,
            p50: point,
            p90: point + resid_q90,
            suggested_price: point.max(0.0),
        }
    }
}

/// In-sample quality of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub mae_p50: f64,
    pub pinball_loss_q10: f64,
    pub pinball_loss_q50: f64,
    pub pinball_loss_q90: f64,
}
