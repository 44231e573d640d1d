use std::sync::Arc;

use lotline_core::TenantId;
use lotline_forecast::{DemandSnapshot, PositionSnapshot, ReadModelReader};
use lotline_stock::{StockPositionId, TransferId};

use crate::projections::demand_history::{DemandHistory, DemandHistoryProjection};
use crate::projections::transfers::{TransferReadModel, TransfersProjection};
use crate::projections::warehouse_stock::{StockSummary, WarehouseStockProjection};
use crate::read_model::TenantStore;

/// `ReadModelReader` over the infrastructure projections.
///
/// Bridges the advisor's storage seam to the stock, demand-history and
/// transfers read models. Positions without a reorder policy are not
/// advisable and are skipped.
#[derive(Debug)]
pub struct ProjectionReadModels<SS, DS, TS>
where
    SS: TenantStore<StockPositionId, StockSummary>,
    DS: TenantStore<StockPositionId, DemandHistory>,
    TS: TenantStore<TransferId, TransferReadModel>,
{
    stock: Arc<WarehouseStockProjection<SS>>,
    demand: Arc<DemandHistoryProjection<DS>>,
    transfers: Arc<TransfersProjection<TS>>,
}

impl<SS, DS, TS> ProjectionReadModels<SS, DS, TS>
where
    SS: TenantStore<StockPositionId, StockSummary>,
    DS: TenantStore<StockPositionId, DemandHistory>,
    TS: TenantStore<TransferId, TransferReadModel>,
{
    pub fn new(
        stock: Arc<WarehouseStockProjection<SS>>,
        demand: Arc<DemandHistoryProjection<DS>>,
        transfers: Arc<TransfersProjection<TS>>,
    ) -> Self {
        Self {
            stock,
            demand,
            transfers,
        }
    }
}

impl<SS, DS, TS> ReadModelReader for ProjectionReadModels<SS, DS, TS>
where
    SS: TenantStore<StockPositionId, StockSummary>,
    DS: TenantStore<StockPositionId, DemandHistory>,
    TS: TenantStore<TransferId, TransferReadModel>,
{
    fn demand_snapshots(&self, tenant_id: TenantId) -> Vec<DemandSnapshot> {
        self.demand
            .list(tenant_id)
            .into_iter()
            .map(|h| DemandSnapshot {
                tenant_id,
                sku: h.sku,
                warehouse: h.warehouse,
                daily_shipments: h.daily_shipments.into_iter().collect(),
            })
            .collect()
    }

    fn position_snapshots(&self, tenant_id: TenantId) -> Vec<PositionSnapshot> {
        self.stock
            .list(tenant_id)
            .into_iter()
            .filter_map(|s| {
                let policy = s.reorder_policy?;
                let in_transit = self.transfers.in_transit(tenant_id, &s.sku, &s.warehouse);
                Some(PositionSnapshot {
                    tenant_id,
                    sku: s.sku,
                    warehouse: s.warehouse,
                    available: s.available,
                    in_transit,
                    reorder_point: policy.reorder_point,
                    reorder_quantity: policy.reorder_quantity,
                    lead_time_days: policy.lead_time_days,
                    low_stock_threshold: policy.low_stock_threshold,
                })
            })
            .collect()
    }
}
