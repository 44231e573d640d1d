use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use lotline_core::{AggregateId, SkuId, TenantId, WarehouseId};
use lotline_events::EventEnvelope;
use lotline_stock::{TransferEvent, TransferId, TransferStatus};

use crate::read_model::TenantStore;

/// Queryable transfer read model, one record per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReadModel {
    pub transfer_id: TransferId,
    pub sku: SkuId,
    pub from_warehouse: WarehouseId,
    pub to_warehouse: WarehouseId,
    pub quantity: i64,
    pub status: TransferStatus,
    pub stuck_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum TransferProjectionError {
    #[error("failed to deserialize transfer event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event out of order: {0}")]
    OutOfOrder(String),
}

/// Transfers projection over transfer aggregate streams.
///
/// Answers "what is in transit towards this warehouse", which the reorder
/// advisor nets against recommendations.
#[derive(Debug)]
pub struct TransfersProjection<S>
where
    S: TenantStore<TransferId, TransferReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> TransfersProjection<S>
where
    S: TenantStore<TransferId, TransferReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, transfer_id: &TransferId) -> Option<TransferReadModel> {
        self.store.get(tenant_id, transfer_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<TransferReadModel> {
        self.store.list(tenant_id)
    }

    /// Total quantity currently shipped towards a warehouse for a SKU.
    pub fn in_transit(&self, tenant_id: TenantId, sku: &SkuId, warehouse: &WarehouseId) -> i64 {
        self.store
            .list(tenant_id)
            .iter()
            .filter(|t| {
                t.status == TransferStatus::Shipped
                    && t.sku == *sku
                    && t.to_warehouse == *warehouse
            })
            .map(|t| t.quantity)
            .sum()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), TransferProjectionError> {
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
            return Err(TransferProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(TransferProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: TransferEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| TransferProjectionError::Deserialize(e.to_string()))?;

        if transfer_event_tenant(&event) != tenant_id {
            return Err(TransferProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let transfer_id = TransferId::new(aggregate_id);
        self.apply_event(tenant_id, transfer_id, &event)?;
        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        event: &TransferEvent,
    ) -> Result<(), TransferProjectionError> {
        match event {
            TransferEvent::TransferRequested(e) => {
                self.store.upsert(
                    tenant_id,
                    transfer_id,
                    TransferReadModel {
                        transfer_id,
                        sku: e.sku.clone(),
                        from_warehouse: e.from_warehouse.clone(),
                        to_warehouse: e.to_warehouse.clone(),
                        quantity: e.quantity,
                        status: TransferStatus::Requested,
                        stuck_reason: None,
                        updated_at: e.occurred_at,
                    },
                );
            }
            TransferEvent::TransferApproved(e) => {
                let mut rm = self.existing(tenant_id, transfer_id)?;
                rm.status = TransferStatus::Approved;
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, transfer_id, rm);
            }
            TransferEvent::TransferShipped(e) => {
                let mut rm = self.existing(tenant_id, transfer_id)?;
                rm.status = TransferStatus::Shipped;
                rm.stuck_reason = None;
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, transfer_id, rm);
            }
            TransferEvent::TransferReceived(e) => {
                let mut rm = self.existing(tenant_id, transfer_id)?;
                rm.status = TransferStatus::Received;
                rm.stuck_reason = None;
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, transfer_id, rm);
            }
            TransferEvent::TransferStuck(e) => {
                let mut rm = self.existing(tenant_id, transfer_id)?;
                rm.status = TransferStatus::Stuck;
                rm.stuck_reason = Some(e.reason.clone());
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, transfer_id, rm);
            }
        }
        Ok(())
    }

    fn existing(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<TransferReadModel, TransferProjectionError> {
        self.store.get(tenant_id, &transfer_id).ok_or_else(|| {
            TransferProjectionError::OutOfOrder(format!("event for unknown transfer {transfer_id}"))
        })
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), TransferProjectionError> {
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

fn transfer_event_tenant(event: &TransferEvent) -> TenantId {
    match event {
        TransferEvent::TransferRequested(e) => e.tenant_id,
        TransferEvent::TransferApproved(e) => e.tenant_id,
        TransferEvent::TransferShipped(e) => e.tenant_id,
        TransferEvent::TransferReceived(e) => e.tenant_id,
        TransferEvent::TransferStuck(e) => e.tenant_id,
    }
}
