//! Demand forecasting job.
//!
//! Model, per SKU/warehouse:
//! - Zero-fill the shipped-per-day history into a contiguous series.
//! - Fit a trailing moving average and simple exponential smoothing.
//! - Backtest both one step ahead and keep whichever has the lower MAE.
//! - Project the winning daily rate flat over the horizon.

use chrono::{Days, NaiveDate};

use lotline_core::TenantId;

use crate::demand::{
    backtest_mae, confidence_from_mae, daily_series, exponential_smoothing, moving_average,
};
use crate::job::AdvisorJob;
use crate::result::{AdvisorError, DemandForecast, ForecastMethod, ForecastPoint};
use crate::scheduler::DemandSnapshot;

/// Deterministic demand forecasting job over demand-history snapshots.
#[derive(Debug, Clone)]
pub struct DemandForecastJob {
    tenant_id: TenantId,
    input: Vec<DemandSnapshot>,
    /// Days to project forward.
    horizon_days: u32,
    /// Moving-average window (must be >= 1).
    window: usize,
    /// Smoothing factor in (0, 1].
    alpha: f64,
    /// Caller-chosen method; `None` keeps whichever backtests better.
    method: Option<ForecastMethod>,
}

impl DemandForecastJob {
    pub fn new(tenant_id: TenantId, input: Vec<DemandSnapshot>) -> Self {
        Self {
            tenant_id,
            input,
            horizon_days: 30,
            window: 7,
            alpha: 0.3,
            method: None,
        }
    }

    pub fn with_horizon_days(mut self, horizon_days: u32) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_method(mut self, method: ForecastMethod) -> Self {
        self.method = Some(method);
        self
    }
}

impl AdvisorJob for DemandForecastJob {
    type Input = Vec<DemandSnapshot>;
    type Output = Vec<DemandForecast>;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Self::Output, AdvisorError> {
        if self.window == 0 {
            return Err(AdvisorError::InvalidInput(
                "moving-average window must be >= 1".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(AdvisorError::InvalidInput(
                "alpha must be in (0, 1]".to_string(),
            ));
        }
        if self.input.iter().any(|s| s.tenant_id != self.tenant_id) {
            return Err(AdvisorError::InvalidInput(
                "tenant_id mismatch between job and snapshot".to_string(),
            ));
        }

        let mut forecasts = Vec::with_capacity(self.input.len());
        for snapshot in &self.input {
            if let Some(forecast) = self.forecast_one(snapshot) {
                forecasts.push(forecast);
            }
        }
        Ok(forecasts)
    }
}

impl DemandForecastJob {
    fn forecast_one(&self, snapshot: &DemandSnapshot) -> Option<DemandForecast> {
        let series = daily_series(&snapshot.daily_shipments);
        // Need at least two points for a one-step backtest.
        if series.len() < 2 {
            return None;
        }

        let window = self.window;
        let alpha = self.alpha;
        let ma_mae = backtest_mae(&series, |hist| moving_average(hist, window.min(hist.len())));
        let es_mae = backtest_mae(&series, |hist| exponential_smoothing(hist, alpha));

        let (method, mae, rate) = match self.method {
            Some(ForecastMethod::MovingAverage) => (
                ForecastMethod::MovingAverage,
                ma_mae?,
                moving_average(&series, window.min(series.len()))?,
            ),
            Some(ForecastMethod::ExponentialSmoothing) => (
                ForecastMethod::ExponentialSmoothing,
                es_mae?,
                exponential_smoothing(&series, alpha)?,
            ),
            None => match (ma_mae, es_mae) {
                (Some(ma), Some(es)) if ma <= es => (
                    ForecastMethod::MovingAverage,
                    ma,
                    moving_average(&series, window.min(series.len()))?,
                ),
                (_, Some(es)) => (
                    ForecastMethod::ExponentialSmoothing,
                    es,
                    exponential_smoothing(&series, alpha)?,
                ),
                (Some(ma), None) => (
                    ForecastMethod::MovingAverage,
                    ma,
                    moving_average(&series, window.min(series.len()))?,
                ),
                (None, None) => return None,
            },
        };

        let daily_rate = rate.max(0.0);
        let last_day = snapshot.daily_shipments.iter().map(|(d, _)| *d).max()?;
        let points = (1..=self.horizon_days)
            .filter_map(|offset| {
                last_day
                    .checked_add_days(Days::new(u64::from(offset)))
                    .map(|date| ForecastPoint {
                        date,
                        quantity: daily_rate,
                    })
            })
            .collect();

        Some(DemandForecast {
            sku: snapshot.sku.clone(),
            warehouse: snapshot.warehouse.clone(),
            method,
            daily_rate,
            mae,
            confidence: confidence_from_mae(mae, &series),
            horizon_days: self.horizon_days,
            points,
        })
    }
}

/// First forecast day helper used by tests and callers rendering projections.
pub fn first_forecast_day(history_end: NaiveDate) -> Option<NaiveDate> {
    history_end.checked_add_days(Days::new(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotline_core::{SkuId, WarehouseId};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn snapshot(tenant_id: TenantId, daily: Vec<(NaiveDate, i64)>) -> DemandSnapshot {
        DemandSnapshot {
            tenant_id,
            sku: SkuId::new("SKU-1").unwrap(),
            warehouse: WarehouseId::new("WH-A").unwrap(),
            daily_shipments: daily,
        }
    }

    #[test]
    fn steady_demand_forecasts_the_same_rate_with_high_confidence() {
        let tenant_id = TenantId::new();
        let daily: Vec<_> = (1..=14).map(|d| (date(d), 10)).collect();
        let job = DemandForecastJob::new(tenant_id, vec![snapshot(tenant_id, daily)])
            .with_horizon_days(7);

        let forecasts = job.run().unwrap();
        assert_eq!(forecasts.len(), 1);
        let f = &forecasts[0];
        assert!((f.daily_rate - 10.0).abs() < 1e-6);
        assert!(f.confidence > 0.95);
        assert_eq!(f.points.len(), 7);
        assert_eq!(f.points[0].date, date(15));
        assert!((f.over_days(7) - 70.0).abs() < 1e-6);
    }

    #[test]
    fn forced_method_overrides_the_backtest_winner() {
        let tenant_id = TenantId::new();
        let daily: Vec<_> = (1..=14).map(|d| (date(d), 10)).collect();

        // Steady demand: the backtest tie goes to the moving average.
        let auto = DemandForecastJob::new(tenant_id, vec![snapshot(tenant_id, daily.clone())])
            .run()
            .unwrap();
        assert_eq!(auto[0].method, ForecastMethod::MovingAverage);

        let forced = DemandForecastJob::new(tenant_id, vec![snapshot(tenant_id, daily)])
            .with_method(ForecastMethod::ExponentialSmoothing)
            .run()
            .unwrap();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].method, ForecastMethod::ExponentialSmoothing);
        assert!((forced[0].daily_rate - 10.0).abs() < 1e-6);
    }

    #[test]
    fn too_short_history_yields_no_forecast() {
        let tenant_id = TenantId::new();
        let job = DemandForecastJob::new(tenant_id, vec![snapshot(tenant_id, vec![(date(1), 5)])]);
        assert!(job.run().unwrap().is_empty());
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let job = DemandForecastJob::new(
            TenantId::new(),
            vec![snapshot(TenantId::new(), vec![(date(1), 5), (date(2), 5)])],
        );
        assert!(matches!(job.run(), Err(AdvisorError::InvalidInput(_))));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let tenant_id = TenantId::new();
        let err = DemandForecastJob::new(tenant_id, Vec::new())
            .with_window(0)
            .run()
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));

        let err = DemandForecastJob::new(tenant_id, Vec::new())
            .with_alpha(1.5)
            .run()
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidInput(_)));
    }
}
