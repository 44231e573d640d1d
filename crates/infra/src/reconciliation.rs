//! Read-model reconciliation against the event stream.
//!
//! The event stream is the source of truth; read models are caches. The
//! reconciler rehydrates each stock position and compares its counters with
//! the projected summary, reporting drift and optionally overwriting the
//! read model with recomputed state.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use lotline_core::{SkuId, TenantId, WarehouseId};
use lotline_events::{EventBus, EventEnvelope};
use lotline_stock::{StockPosition, StockPositionId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::warehouse_stock::{LotSummary, StockSummary, WarehouseStockProjection};
use crate::read_model::TenantStore;

/// One counter that disagrees between read model and stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftField {
    pub field: &'static str,
    pub read_model: i64,
    pub stream: i64,
}

/// All drift found on one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionDrift {
    pub position_id: StockPositionId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub fields: Vec<DriftField>,
    pub repaired: bool,
}

/// Outcome of a reconciliation pass over one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub tenant_id: TenantId,
    pub positions_checked: usize,
    pub drifted: Vec<PositionDrift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty()
    }
}

/// Compares projected stock summaries against rehydrated aggregate state.
#[derive(Debug)]
pub struct Reconciler<S, B, RS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<StockPositionId, StockSummary>,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
    stock: Arc<WarehouseStockProjection<RS>>,
}

impl<S, B, RS> Reconciler<S, B, RS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<StockPositionId, StockSummary>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        stock: Arc<WarehouseStockProjection<RS>>,
    ) -> Self {
        Self { dispatcher, stock }
    }

    /// Detect drift without modifying anything.
    pub fn check(&self, tenant_id: TenantId) -> Result<DriftReport, DispatchError> {
        self.run(tenant_id, false, None)
    }

    /// Detect drift and overwrite drifted read models with stream state.
    pub fn repair(&self, tenant_id: TenantId) -> Result<DriftReport, DispatchError> {
        self.run(tenant_id, true, None)
    }

    /// Reconcile a single position instead of the whole tenant.
    pub fn run_for_position(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
        repair: bool,
    ) -> Result<DriftReport, DispatchError> {
        let position_id = StockPositionId::derive(tenant_id, sku, warehouse);
        self.run(tenant_id, repair, Some(position_id))
    }

    fn run(
        &self,
        tenant_id: TenantId,
        repair: bool,
        scope: Option<StockPositionId>,
    ) -> Result<DriftReport, DispatchError> {
        let mut summaries = self.stock.list(tenant_id);
        if let Some(position_id) = scope {
            summaries.retain(|s| s.position_id == position_id);
        }
        let mut drifted = Vec::new();

        for summary in &summaries {
            let position_id = summary.position_id;
            let position = self
                .dispatcher
                .rehydrate(tenant_id, position_id.0, |_, _| {
                    StockPosition::empty(position_id)
                })?;

            let fields = diff_position(summary, &position);
            if fields.is_empty() {
                continue;
            }

            warn!(%position_id, drift_fields = fields.len(), "read model drift detected");

            let mut repaired = false;
            if repair {
                self.stock.replace_summary(
                    tenant_id,
                    summary_from_position(
                        position_id,
                        summary.sku.clone(),
                        summary.warehouse.clone(),
                        &position,
                    ),
                );
                repaired = true;
            }

            drifted.push(PositionDrift {
                position_id,
                sku: summary.sku.clone(),
                warehouse: summary.warehouse.clone(),
                fields,
                repaired,
            });
        }

        let report = DriftReport {
            tenant_id,
            positions_checked: summaries.len(),
            drifted,
        };

        if report.is_clean() {
            info!(checked = report.positions_checked, "reconciliation clean");
        }

        Ok(report)
    }
}

fn diff_position(summary: &StockSummary, position: &StockPosition) -> Vec<DriftField> {
    let mut fields = Vec::new();
    let mut push = |field: &'static str, read_model: i64, stream: i64| {
        if read_model != stream {
            fields.push(DriftField {
                field,
                read_model,
                stream,
            });
        }
    };

    push("on_hand", summary.on_hand, position.on_hand_total());
    push("reserved", summary.reserved, position.reserved_total());
    push("available", summary.available, position.available_total());
    push("committed", summary.committed, position.committed_total());
    push(
        "lot_count",
        summary.lots.len() as i64,
        position.lots().count() as i64,
    );

    fields
}

/// Recompute a stock summary from authoritative aggregate state.
pub fn summary_from_position(
    position_id: StockPositionId,
    sku: SkuId,
    warehouse: WarehouseId,
    position: &StockPosition,
) -> StockSummary {
    let lots = position
        .lots()
        .map(|lot| LotSummary {
            lot_id: lot.id,
            lot_number: lot.lot_number,
            current_quantity: lot.current_quantity,
            reserved_quantity: lot.reserved_quantity,
            quality: lot.quality,
            expiration: lot.expiration,
            best_before: lot.best_before,
            bin_location: lot.bin_location.clone(),
            received_at: lot.received_at,
        })
        .collect();

    StockSummary {
        position_id,
        sku: position.sku().cloned().unwrap_or(sku),
        warehouse: position.warehouse().cloned().unwrap_or(warehouse),
        on_hand: position.on_hand_total(),
        reserved: position.reserved_total(),
        committed: position.committed_total(),
        available: position.available_total(),
        lots,
        reorder_policy: position.reorder_policy().cloned(),
    }
}
