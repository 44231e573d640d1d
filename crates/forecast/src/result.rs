use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lotline_core::{SkuId, WarehouseId};

/// Forecasting method that produced a projection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    MovingAverage,
    ExponentialSmoothing,
}

impl core::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ForecastMethod::MovingAverage => "moving_average",
            ForecastMethod::ExponentialSmoothing => "exponential_smoothing",
        };
        f.write_str(s)
    }
}

/// One projected day of demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub quantity: f64,
}

/// Demand projection for one SKU at one warehouse.
///
/// This is an advisory insight, not a domain event. It can be persisted or
/// displayed by higher layers without mutating domain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub method: ForecastMethod,
    /// Smoothed units shipped per day.
    pub daily_rate: f64,
    /// One-step-ahead mean absolute error over the history (backtest).
    pub mae: f64,
    /// Confidence in \[0, 1\], derived from the backtest error.
    pub confidence: f64,
    pub horizon_days: u32,
    pub points: Vec<ForecastPoint>,
}

impl DemandForecast {
    /// Projected demand over the next `days` days.
    pub fn over_days(&self, days: u32) -> f64 {
        self.daily_rate * f64::from(days)
    }
}

/// Replenishment advice for one SKU at one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderRecommendation {
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub available: i64,
    pub in_transit: i64,
    pub reorder_point: i64,
    /// Projected demand during the replenishment lead time.
    pub forecast_over_lead_time: f64,
    pub recommended_quantity: i64,
    /// Available stock fell under the operator's low-stock threshold.
    pub low_stock: bool,
    pub explanation: String,
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("projection failed: {0}")]
    ProjectionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
