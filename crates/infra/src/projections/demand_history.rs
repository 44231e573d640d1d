use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use lotline_core::{AggregateId, SkuId, TenantId, WarehouseId};
use lotline_events::EventEnvelope;
use lotline_stock::{StockEvent, StockPositionId};

use crate::projections::warehouse_stock::event_tenant;
use crate::read_model::TenantStore;

/// Daily shipped-quantity history for one SKU + warehouse position.
///
/// Feeds the demand forecaster. Only committed shipments count as demand;
/// reservations, adjustments and transfers do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandHistory {
    pub position_id: StockPositionId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub daily_shipments: BTreeMap<NaiveDate, i64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum DemandProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event out of order: {0}")]
    OutOfOrder(String),
}

/// Demand history projection over stock position streams.
#[derive(Debug)]
pub struct DemandHistoryProjection<S>
where
    S: TenantStore<StockPositionId, DemandHistory>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> DemandHistoryProjection<S>
where
    S: TenantStore<StockPositionId, DemandHistory>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, position_id: &StockPositionId) -> Option<DemandHistory> {
        self.store.get(tenant_id, position_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<DemandHistory> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DemandProjectionError> {
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
            return Err(DemandProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(DemandProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| DemandProjectionError::Deserialize(e.to_string()))?;

        if event_tenant(&event) != tenant_id {
            return Err(DemandProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let position_id = StockPositionId::new(aggregate_id);
        self.apply_event(tenant_id, position_id, &event)?;
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        position_id: StockPositionId,
        event: &StockEvent,
    ) -> Result<(), DemandProjectionError> {
        match event {
            // Stream-establishing events record the position identity so the
            // advisor can enumerate positions with zero shipment history.
            StockEvent::LotReceived(e) => {
                self.ensure_history(tenant_id, position_id, &e.sku, &e.warehouse);
            }
            StockEvent::TransferArrived(e) => {
                self.ensure_history(tenant_id, position_id, &e.sku, &e.warehouse);
            }
            StockEvent::ReorderPolicySet(e) => {
                self.ensure_history(tenant_id, position_id, &e.sku, &e.warehouse);
            }
            StockEvent::ShipmentCommitted(e) => {
                let mut history = self.store.get(tenant_id, &position_id).ok_or_else(|| {
                    DemandProjectionError::OutOfOrder(format!(
                        "shipment for unknown position {position_id}"
                    ))
                })?;
                let day = e.occurred_at.date_naive();
                let shipped: i64 = e.draws.iter().map(|d| d.quantity).sum();
                *history.daily_shipments.entry(day).or_insert(0) += shipped;
                self.store.upsert(tenant_id, position_id, history);
            }
            _ => {}
        }
        Ok(())
    }

    fn ensure_history(
        &self,
        tenant_id: TenantId,
        position_id: StockPositionId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) {
        if self.store.get(tenant_id, &position_id).is_none() {
            self.store.upsert(
                tenant_id,
                position_id,
                DemandHistory {
                    position_id,
                    sku: sku.clone(),
                    warehouse: warehouse.clone(),
                    daily_shipments: BTreeMap::new(),
                },
            );
        }
    }

    /// Rebuild from scratch by replaying envelopes in deterministic order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DemandProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

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
