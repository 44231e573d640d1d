//! Reorder advisory job.
//!
//! Trigger rule: a position needs replenishment when `available + in_transit`
//! drops below its reorder point. The recommended quantity tops the
//! operator's fixed reorder quantity up with the demand forecast over the
//! replenishment lead time, net of stock already travelling here.

use lotline_core::TenantId;

use crate::job::AdvisorJob;
use crate::result::{AdvisorError, DemandForecast, ReorderRecommendation};
use crate::scheduler::{DemandSnapshot, PositionSnapshot};

/// Input for [`ReorderAdvisorJob`]: current positions plus the forecasts
/// computed from the same tenant's demand history.
#[derive(Debug, Clone)]
pub struct ReorderInput {
    pub positions: Vec<PositionSnapshot>,
    pub forecasts: Vec<DemandForecast>,
}

impl ReorderInput {
    fn forecast_for(&self, position: &PositionSnapshot) -> Option<&DemandForecast> {
        self.forecasts
            .iter()
            .find(|f| f.sku == position.sku && f.warehouse == position.warehouse)
    }
}

/// Deterministic reorder advisor over position snapshots.
#[derive(Debug, Clone)]
pub struct ReorderAdvisorJob {
    tenant_id: TenantId,
    input: ReorderInput,
}

impl ReorderAdvisorJob {
    pub fn new(tenant_id: TenantId, input: ReorderInput) -> Self {
        Self { tenant_id, input }
    }
}

impl AdvisorJob for ReorderAdvisorJob {
    type Input = ReorderInput;
    type Output = Vec<ReorderRecommendation>;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Self::Output, AdvisorError> {
        if self
            .input
            .positions
            .iter()
            .any(|p| p.tenant_id != self.tenant_id)
        {
            return Err(AdvisorError::InvalidInput(
                "tenant_id mismatch between job and snapshot".to_string(),
            ));
        }

        let mut recommendations = Vec::new();
        for position in &self.input.positions {
            if let Some(rec) = self.advise(position) {
                recommendations.push(rec);
            }
        }
        Ok(recommendations)
    }
}

impl ReorderAdvisorJob {
    fn advise(&self, position: &PositionSnapshot) -> Option<ReorderRecommendation> {
        let projected = position.available + position.in_transit;
        let low_stock = position.available < position.low_stock_threshold;
        let below_reorder_point = projected < position.reorder_point;

        if !below_reorder_point && !low_stock {
            return None;
        }

        let forecast_over_lead_time = self
            .input
            .forecast_for(position)
            .map(|f| f.over_days(position.lead_time_days))
            .unwrap_or(0.0);

        let recommended_quantity = if below_reorder_point {
            // Net the in-transit stock off the lead-time demand so a transfer
            // already on its way is not reordered twice.
            let lead_time_gap =
                (forecast_over_lead_time - position.in_transit as f64).ceil().max(0.0) as i64;
            position.reorder_quantity + lead_time_gap
        } else {
            0
        };

        let explanation = if below_reorder_point {
            format!(
                "available {} + in transit {} is below reorder point {}; lead-time demand {:.1}",
                position.available,
                position.in_transit,
                position.reorder_point,
                forecast_over_lead_time,
            )
        } else {
            format!(
                "available {} is below the low-stock threshold {}",
                position.available, position.low_stock_threshold,
            )
        };

        Some(ReorderRecommendation {
            sku: position.sku.clone(),
            warehouse: position.warehouse.clone(),
            available: position.available,
            in_transit: position.in_transit,
            reorder_point: position.reorder_point,
            forecast_over_lead_time,
            recommended_quantity,
            low_stock,
            explanation,
        })
    }
}

/// Convenience wrapper: forecast demand and derive reorder advice in one call.
pub fn advise_from_snapshots(
    tenant_id: TenantId,
    demand: Vec<DemandSnapshot>,
    positions: Vec<PositionSnapshot>,
    horizon_days: u32,
) -> Result<(Vec<DemandForecast>, Vec<ReorderRecommendation>), AdvisorError> {
    let forecasts = crate::forecast::DemandForecastJob::new(tenant_id, demand)
        .with_horizon_days(horizon_days)
        .run()?;
    let recommendations = ReorderAdvisorJob::new(
        tenant_id,
        ReorderInput {
            positions,
            forecasts: forecasts.clone(),
        },
    )
    .run()?;
    Ok((forecasts, recommendations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ForecastMethod, ForecastPoint};
    use chrono::NaiveDate;
    use lotline_core::{SkuId, WarehouseId};

    fn position(tenant_id: TenantId, available: i64, in_transit: i64) -> PositionSnapshot {
        PositionSnapshot {
            tenant_id,
            sku: SkuId::new("SKU-1").unwrap(),
            warehouse: WarehouseId::new("WH-A").unwrap(),
            available,
            in_transit,
            reorder_point: 50,
            reorder_quantity: 100,
            lead_time_days: 10,
            low_stock_threshold: 20,
        }
    }

    fn forecast(daily_rate: f64) -> DemandForecast {
        DemandForecast {
            sku: SkuId::new("SKU-1").unwrap(),
            warehouse: WarehouseId::new("WH-A").unwrap(),
            method: ForecastMethod::ExponentialSmoothing,
            daily_rate,
            mae: 0.5,
            confidence: 0.9,
            horizon_days: 30,
            points: vec![ForecastPoint {
                date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                quantity: daily_rate,
            }],
        }
    }

    #[test]
    fn position_above_reorder_point_gets_no_recommendation() {
        let tenant_id = TenantId::new();
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 80, 0)],
                forecasts: vec![forecast(5.0)],
            },
        );
        assert!(job.run().unwrap().is_empty());
    }

    #[test]
    fn recommendation_tops_up_with_lead_time_demand() {
        let tenant_id = TenantId::new();
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 30, 0)],
                forecasts: vec![forecast(5.0)],
            },
        );

        let recs = job.run().unwrap();
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        // 100 fixed + 5/day * 10 days of lead-time demand.
        assert_eq!(rec.recommended_quantity, 150);
        assert!((rec.forecast_over_lead_time - 50.0).abs() < 1e-9);
        assert!(!rec.low_stock);
    }

    #[test]
    fn in_transit_stock_counts_toward_the_reorder_point() {
        let tenant_id = TenantId::new();
        // 30 available + 25 in transit = 55, above the reorder point of 50.
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 30, 25)],
                forecasts: vec![forecast(5.0)],
            },
        );
        assert!(job.run().unwrap().is_empty());
    }

    #[test]
    fn in_transit_stock_is_netted_off_the_lead_time_demand() {
        let tenant_id = TenantId::new();
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 10, 20)],
                forecasts: vec![forecast(5.0)],
            },
        );

        let recs = job.run().unwrap();
        // 100 fixed + max(0, 50 - 20) of uncovered lead-time demand.
        assert_eq!(recs[0].recommended_quantity, 130);
    }

    #[test]
    fn low_stock_alone_alerts_without_a_reorder_quantity() {
        let tenant_id = TenantId::new();
        // 15 available + 40 in transit = 55 clears the reorder point, but
        // available is under the low-stock threshold of 20.
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 15, 40)],
                forecasts: vec![forecast(5.0)],
            },
        );

        let recs = job.run().unwrap();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].low_stock);
        assert_eq!(recs[0].recommended_quantity, 0);
    }

    #[test]
    fn missing_forecast_falls_back_to_fixed_quantity() {
        let tenant_id = TenantId::new();
        let job = ReorderAdvisorJob::new(
            tenant_id,
            ReorderInput {
                positions: vec![position(tenant_id, 30, 0)],
                forecasts: Vec::new(),
            },
        );

        let recs = job.run().unwrap();
        assert_eq!(recs[0].recommended_quantity, 100);
    }
}
