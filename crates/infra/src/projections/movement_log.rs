use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use lotline_core::{AggregateId, SkuId, TenantId, WarehouseId};
use lotline_events::EventEnvelope;
use lotline_stock::{Movement, StockEvent, StockPositionId, movements_for};

use crate::projections::warehouse_stock::event_tenant;
use crate::read_model::TenantStore;

/// Append-only movement ledger for one SKU + warehouse position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLog {
    pub position_id: StockPositionId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub entries: Vec<Movement>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum MovementProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event out of order: {0}")]
    OutOfOrder(String),
}

/// Movement ledger projection.
///
/// Flattens position events into per-lot ledger lines via `movements_for`,
/// preserving stream order within each position.
#[derive(Debug)]
pub struct MovementLogProjection<S>
where
    S: TenantStore<StockPositionId, MovementLog>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> MovementLogProjection<S>
where
    S: TenantStore<StockPositionId, MovementLog>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, position_id: &StockPositionId) -> Option<MovementLog> {
        self.store.get(tenant_id, position_id)
    }

    pub fn get_by_sku(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) -> Option<MovementLog> {
        let position_id = StockPositionId::derive(tenant_id, sku, warehouse);
        self.store.get(tenant_id, &position_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<MovementLog> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MovementProjectionError> {
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
            return Err(MovementProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(MovementProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MovementProjectionError::Deserialize(e.to_string()))?;

        if event_tenant(&event) != tenant_id {
            return Err(MovementProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let position_id = StockPositionId::new(aggregate_id);

        let mut log = match &event {
            StockEvent::LotReceived(e) => self.ensure_log(tenant_id, position_id, &e.sku, &e.warehouse),
            StockEvent::TransferArrived(e) => {
                self.ensure_log(tenant_id, position_id, &e.sku, &e.warehouse)
            }
            StockEvent::ReorderPolicySet(e) => {
                self.ensure_log(tenant_id, position_id, &e.sku, &e.warehouse)
            }
            _ => self.store.get(tenant_id, &position_id).ok_or_else(|| {
                MovementProjectionError::OutOfOrder(format!(
                    "event for unknown position {position_id}"
                ))
            })?,
        };

        let lines = movements_for(&event);
        if !lines.is_empty() {
            log.entries.extend(lines);
            self.store.upsert(tenant_id, position_id, log);
        } else if self.store.get(tenant_id, &position_id).is_none() {
            self.store.upsert(tenant_id, position_id, log);
        }

        cursors.insert(key, seq);
        Ok(())
    }

    fn ensure_log(
        &self,
        tenant_id: TenantId,
        position_id: StockPositionId,
        sku: &SkuId,
        warehouse: &WarehouseId,
    ) -> MovementLog {
        self.store
            .get(tenant_id, &position_id)
            .unwrap_or_else(|| MovementLog {
                position_id,
                sku: sku.clone(),
                warehouse: warehouse.clone(),
                entries: Vec::new(),
            })
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), MovementProjectionError> {
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
