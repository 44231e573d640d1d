use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use lotline_core::{AggregateId, SkuId, TenantId, WarehouseId};
use lotline_events::EventEnvelope;
use lotline_stock::{
    AllocationId, LotId, QualityStatus, ReorderPolicy, StockEvent, StockPositionId,
};

use crate::read_model::TenantStore;

/// Per-lot slice of the stock read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSummary {
    pub lot_id: LotId,
    pub lot_number: u32,
    pub current_quantity: i64,
    pub reserved_quantity: i64,
    pub quality: QualityStatus,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub bin_location: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl LotSummary {
    fn is_sellable(&self) -> bool {
        self.quality.is_sellable()
    }
}

/// Queryable stock read model: one record per SKU + warehouse position.
///
/// `available` counts only sellable lots net of reservations; `reserved`
/// covers both soft reservations and committed (picked/packed) stock, with
/// `committed` breaking out the latter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub position_id: StockPositionId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub on_hand: i64,
    pub reserved: i64,
    pub committed: i64,
    pub available: i64,
    pub lots: Vec<LotSummary>,
    pub reorder_policy: Option<ReorderPolicy>,
}

impl StockSummary {
    fn new(position_id: StockPositionId, sku: SkuId, warehouse: WarehouseId) -> Self {
        Self {
            position_id,
            sku,
            warehouse,
            on_hand: 0,
            reserved: 0,
            committed: 0,
            available: 0,
            lots: Vec::new(),
            reorder_policy: None,
        }
    }

    fn lot_mut(&mut self, lot_id: &LotId) -> Option<&mut LotSummary> {
        self.lots.iter_mut().find(|l| l.lot_id == *lot_id)
    }

    fn recompute_totals(&mut self) {
        self.on_hand = self.lots.iter().map(|l| l.current_quantity).sum();
        self.reserved = self.lots.iter().map(|l| l.reserved_quantity).sum();
        self.available = self
            .lots
            .iter()
            .filter(|l| l.is_sellable())
            .map(|l| l.current_quantity - l.reserved_quantity)
            .sum();
    }
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event out of order: {0}")]
    OutOfOrder(String),
}

/// Warehouse stock projection.
///
/// Consumes published envelopes from stock position streams and maintains a
/// tenant-isolated read model, plus an allocation → position index so
/// fulfilment calls can find the owning stream from an allocation ID alone.
/// Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct WarehouseStockProjection<S>
where
    S: TenantStore<StockPositionId, StockSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    allocation_index: RwLock<HashMap<(TenantId, AllocationId), StockPositionId>>,
}

impl<S> WarehouseStockProjection<S>
where
    S: TenantStore<StockPositionId, StockSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            allocation_index: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one position.
    pub fn get(&self, tenant_id: TenantId, position_id: &StockPositionId) -> Option<StockSummary> {
        self.store.get(tenant_id, position_id)
    }

    /// Query by SKU + warehouse via the deterministic position ID.
    pub fn get_by_sku(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) -> Option<StockSummary> {
        let position_id = StockPositionId::derive(tenant_id, sku, warehouse);
        self.store.get(tenant_id, &position_id)
    }

    /// List all positions for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockSummary> {
        self.store.list(tenant_id)
    }

    /// Find the position an allocation was made against.
    pub fn position_for_allocation(
        &self,
        tenant_id: TenantId,
        allocation_id: &AllocationId,
    ) -> Option<StockPositionId> {
        let index = self.allocation_index.read().ok()?;
        index.get(&(tenant_id, *allocation_id)).copied()
    }

    /// Register an allocation in the lookup index ahead of envelope delivery.
    ///
    /// The allocation service calls this with the committed event in hand, so
    /// a release arriving before the projection catches up still resolves the
    /// owning position. The projection write is idempotent over this one.
    pub fn index_allocation(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
        position_id: StockPositionId,
    ) {
        if let Ok(mut index) = self.allocation_index.write() {
            index.insert((tenant_id, allocation_id), position_id);
        }
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation
    /// - Enforces monotonic sequence per (tenant, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let key = CursorKey {
            tenant_id,
            aggregate_id,
        };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        if event_tenant(&event) != tenant_id {
            return Err(StockProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let position_id = StockPositionId::new(aggregate_id);
        self.apply_event(tenant_id, position_id, &event)?;

        // Advance cursor after successful apply.
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        position_id: StockPositionId,
        event: &StockEvent,
    ) -> Result<(), StockProjectionError> {
        let mut summary = match event {
            // Stream-establishing events may create the record.
            StockEvent::LotReceived(e) => self
                .store
                .get(tenant_id, &position_id)
                .unwrap_or_else(|| {
                    StockSummary::new(position_id, e.sku.clone(), e.warehouse.clone())
                }),
            StockEvent::TransferArrived(e) => self
                .store
                .get(tenant_id, &position_id)
                .unwrap_or_else(|| {
                    StockSummary::new(position_id, e.sku.clone(), e.warehouse.clone())
                }),
            StockEvent::ReorderPolicySet(e) => self
                .store
                .get(tenant_id, &position_id)
                .unwrap_or_else(|| {
                    StockSummary::new(position_id, e.sku.clone(), e.warehouse.clone())
                }),
            _ => self.store.get(tenant_id, &position_id).ok_or_else(|| {
                StockProjectionError::OutOfOrder(format!(
                    "event for unknown position {position_id}"
                ))
            })?,
        };

        match event {
            StockEvent::LotReceived(e) => {
                summary.lots.push(LotSummary {
                    lot_id: e.lot_id,
                    lot_number: e.lot_number,
                    current_quantity: e.quantity,
                    reserved_quantity: 0,
                    quality: QualityStatus::Pending,
                    expiration: e.expiration,
                    best_before: e.best_before,
                    bin_location: e.bin_location.clone(),
                    received_at: e.occurred_at,
                });
            }
            StockEvent::TransferArrived(e) => {
                summary.lots.push(LotSummary {
                    lot_id: e.lot_id,
                    lot_number: e.lot_number,
                    current_quantity: e.quantity,
                    reserved_quantity: 0,
                    quality: QualityStatus::Passed,
                    expiration: e.expiration,
                    best_before: e.best_before,
                    bin_location: None,
                    received_at: e.occurred_at,
                });
            }
            StockEvent::ReorderPolicySet(e) => {
                summary.reorder_policy = Some(e.policy.clone());
            }
            StockEvent::LotQualityUpdated(e) => {
                if let Some(lot) = summary.lot_mut(&e.lot_id) {
                    lot.quality = e.status;
                }
            }
            StockEvent::StockAllocated(e) => {
                for draw in &e.draws {
                    if let Some(lot) = summary.lot_mut(&draw.lot_id) {
                        lot.reserved_quantity += draw.quantity;
                    }
                }
                if let Ok(mut index) = self.allocation_index.write() {
                    index.insert((tenant_id, e.allocation_id), position_id);
                }
            }
            StockEvent::AllocationReleased(e) => {
                let total: i64 = e.draws.iter().map(|d| d.quantity).sum();
                for draw in &e.draws {
                    if let Some(lot) = summary.lot_mut(&draw.lot_id) {
                        lot.reserved_quantity -= draw.quantity;
                    }
                }
                if e.was_committed {
                    summary.committed -= total;
                }
            }
            StockEvent::AllocationPicked(e) => {
                summary.committed += e.draws.iter().map(|d| d.quantity).sum::<i64>();
            }
            StockEvent::AllocationPacked(_) => {}
            StockEvent::ShipmentCommitted(e) => {
                let total: i64 = e.draws.iter().map(|d| d.quantity).sum();
                for draw in &e.draws {
                    if let Some(lot) = summary.lot_mut(&draw.lot_id) {
                        lot.current_quantity -= draw.quantity;
                        lot.reserved_quantity -= draw.quantity;
                    }
                }
                if !e.skipped_pick {
                    summary.committed -= total;
                }
            }
            StockEvent::LotAdjusted(e) => {
                if let Some(lot) = summary.lot_mut(&e.lot_id) {
                    lot.current_quantity += e.delta;
                }
            }
            StockEvent::LotWrittenOff(e) => {
                if let Some(lot) = summary.lot_mut(&e.lot_id) {
                    lot.current_quantity -= e.quantity;
                }
            }
            StockEvent::TransferDispatched(e) => {
                for draw in &e.draws {
                    if let Some(lot) = summary.lot_mut(&draw.lot_id) {
                        lot.current_quantity -= draw.quantity;
                    }
                }
            }
        }

        summary.recompute_totals();
        self.store.upsert(tenant_id, position_id, summary);
        Ok(())
    }

    /// Overwrite one read model record with authoritative state.
    ///
    /// Used by the reconciler to repair drift detected against the event
    /// stream; normal updates go through `apply_envelope`.
    pub fn replace_summary(&self, tenant_id: TenantId, summary: StockSummary) {
        self.store.upsert(tenant_id, summary.position_id, summary);
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        if let Ok(mut index) = self.allocation_index.write() {
            index.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per tenant before rebuilding.
        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

        // Deterministic replay order: tenant, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

pub(crate) fn event_tenant(event: &StockEvent) -> TenantId {
    match event {
        StockEvent::LotReceived(e) => e.tenant_id,
        StockEvent::LotQualityUpdated(e) => e.tenant_id,
        StockEvent::StockAllocated(e) => e.tenant_id,
        StockEvent::AllocationReleased(e) => e.tenant_id,
        StockEvent::AllocationPicked(e) => e.tenant_id,
        StockEvent::AllocationPacked(e) => e.tenant_id,
        StockEvent::ShipmentCommitted(e) => e.tenant_id,
        StockEvent::LotAdjusted(e) => e.tenant_id,
        StockEvent::LotWrittenOff(e) => e.tenant_id,
        StockEvent::TransferDispatched(e) => e.tenant_id,
        StockEvent::TransferArrived(e) => e.tenant_id,
        StockEvent::ReorderPolicySet(e) => e.tenant_id,
    }
}
