//! Allocation orchestration over stock position streams.
//!
//! The aggregate decides which lots to draw; this service decides which
//! warehouse to allocate from and absorbs optimistic concurrency races. Two
//! requests hitting the same position race on the stream version: the loser
//! retries against fresh state with exponential backoff until it wins or the
//! retry budget is exhausted (`DispatchError::LockTimeout`).

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use lotline_core::{SkuId, TenantId, WarehouseId};
use lotline_events::{EventBus, EventEnvelope};
use lotline_stock::{
    AllocateStock, Allocation, AllocationId, CommitShipment, LotDraw, PackAllocation,
    PickAllocation, ReleaseAllocation, RotationPolicy, StockCommand, StockEvent, StockPosition,
    StockPositionId,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::AllocationConfig;
use crate::event_store::EventStore;
use crate::projections::warehouse_stock::{StockSummary, WarehouseStockProjection};
use crate::read_model::TenantStore;

/// Aggregate type tag for stock position streams.
pub const STOCK_POSITION_AGGREGATE_TYPE: &str = "stock.position";

/// An allocation request before warehouse resolution.
#[derive(Debug, Clone)]
pub struct AllocateRequest {
    pub sku: SkuId,
    /// When `None`, the service resolves a warehouse from the stock read model.
    pub warehouse: Option<WarehouseId>,
    pub quantity: i64,
    pub order_line_ref: String,
    pub rotation_policy: Option<RotationPolicy>,
    pub allow_partial: bool,
}

/// Committed allocation result.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub allocation_id: AllocationId,
    pub position_id: StockPositionId,
    pub warehouse: WarehouseId,
    pub draws: Vec<LotDraw>,
    pub partial: bool,
}

/// Coordinates allocation commands against stock position streams.
#[derive(Debug)]
pub struct AllocationService<S, B, RS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<StockPositionId, StockSummary>,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
    stock: Arc<WarehouseStockProjection<RS>>,
    config: AllocationConfig,
}

impl<S, B, RS> AllocationService<S, B, RS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    RS: TenantStore<StockPositionId, StockSummary>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        stock: Arc<WarehouseStockProjection<RS>>,
        config: AllocationConfig,
    ) -> Self {
        Self {
            dispatcher,
            stock,
            config,
        }
    }

    /// Allocate stock for an order line, resolving the warehouse if needed.
    pub fn allocate(
        &self,
        tenant_id: TenantId,
        request: AllocateRequest,
    ) -> Result<AllocationOutcome, DispatchError> {
        let warehouse = match &request.warehouse {
            Some(w) => w.clone(),
            None => self.resolve_warehouse(tenant_id, &request.sku, request.quantity)?,
        };

        let position_id = StockPositionId::derive(tenant_id, &request.sku, &warehouse);
        let allocation_id = AllocationId::new();

        let command = StockCommand::AllocateStock(AllocateStock {
            tenant_id,
            allocation_id,
            order_line_ref: request.order_line_ref.clone(),
            quantity: request.quantity,
            rotation_policy: request.rotation_policy,
            allow_partial: request.allow_partial,
            occurred_at: Utc::now(),
        });

        let committed = self.dispatch_with_retry(tenant_id, position_id, command)?;

        // Extract the committed draws from the persisted event.
        for stored in &committed {
            if let Ok(StockEvent::StockAllocated(e)) =
                serde_json::from_value::<StockEvent>(stored.payload.clone())
            {
                // Index synchronously so a release racing the projection
                // still finds the position.
                self.stock.index_allocation(tenant_id, e.allocation_id, position_id);
                return Ok(AllocationOutcome {
                    allocation_id: e.allocation_id,
                    position_id,
                    warehouse,
                    draws: e.draws,
                    partial: e.partial,
                });
            }
        }

        Err(DispatchError::Store(
            crate::event_store::EventStoreError::InvalidAppend(
                "allocation dispatch committed no StockAllocated event".to_string(),
            ),
        ))
    }

    /// Release a reservation back to available stock. Idempotent.
    pub fn release(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<(), DispatchError> {
        let position_id = self.position_for(tenant_id, allocation_id)?;
        let command = StockCommand::ReleaseAllocation(ReleaseAllocation {
            tenant_id,
            allocation_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_with_retry(tenant_id, position_id, command)?;
        Ok(())
    }

    /// Record a warehouse pick, committing the reservation.
    pub fn pick(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<(), DispatchError> {
        let position_id = self.position_for(tenant_id, allocation_id)?;
        let command = StockCommand::PickAllocation(PickAllocation {
            tenant_id,
            allocation_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_with_retry(tenant_id, position_id, command)?;
        Ok(())
    }

    /// Record packing of a picked allocation.
    pub fn pack(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<(), DispatchError> {
        let position_id = self.position_for(tenant_id, allocation_id)?;
        let command = StockCommand::PackAllocation(PackAllocation {
            tenant_id,
            allocation_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_with_retry(tenant_id, position_id, command)?;
        Ok(())
    }

    /// Commit the shipment: reservations become physical decrements.
    pub fn commit_shipment(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<(), DispatchError> {
        let position_id = self.position_for(tenant_id, allocation_id)?;
        let command = StockCommand::CommitShipment(CommitShipment {
            tenant_id,
            allocation_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_with_retry(tenant_id, position_id, command)?;
        Ok(())
    }

    /// Current state of an allocation, rehydrated from the stream.
    pub fn allocation(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<Allocation, DispatchError> {
        let position_id = self.position_for(tenant_id, allocation_id)?;
        let position = self.dispatcher.rehydrate(tenant_id, position_id.0, |_, _| {
            StockPosition::empty(position_id)
        })?;
        position
            .allocation(&allocation_id)
            .cloned()
            .ok_or(DispatchError::NotFound)
    }

    fn position_for(
        &self,
        tenant_id: TenantId,
        allocation_id: AllocationId,
    ) -> Result<StockPositionId, DispatchError> {
        self.stock
            .position_for_allocation(tenant_id, &allocation_id)
            .ok_or(DispatchError::NotFound)
    }

    /// Pick a warehouse for an unpinned request.
    ///
    /// Order: first configured priority warehouse that can cover the full
    /// quantity, then the deepest position with any sellable stock.
    fn resolve_warehouse(
        &self,
        tenant_id: TenantId,
        sku: &SkuId,
        quantity: i64,
    ) -> Result<WarehouseId, DispatchError> {
        let positions: Vec<StockSummary> = self
            .stock
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.sku == *sku)
            .collect();

        if positions.is_empty() {
            return Err(DispatchError::UnknownSku(format!(
                "no stock position for SKU {sku}"
            )));
        }

        for preferred in &self.config.warehouse_priority {
            if let Some(s) = positions.iter().find(|s| s.warehouse == *preferred) {
                if s.available >= quantity {
                    return Ok(s.warehouse.clone());
                }
            }
        }

        positions
            .iter()
            .filter(|s| s.available > 0)
            .max_by_key(|s| s.available)
            .map(|s| s.warehouse.clone())
            .ok_or_else(|| DispatchError::InsufficientStock {
                requested: quantity,
                available: 0,
            })
    }

    fn dispatch_with_retry(
        &self,
        tenant_id: TenantId,
        position_id: StockPositionId,
        command: StockCommand,
    ) -> Result<Vec<crate::event_store::StoredEvent>, DispatchError> {
        let mut attempt = 0u32;
        loop {
            let result = self.dispatcher.dispatch::<StockPosition>(
                tenant_id,
                position_id.0,
                STOCK_POSITION_AGGREGATE_TYPE,
                command.clone(),
                |_, _| StockPosition::empty(position_id),
            );

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(%position_id, attempt, "lost append race, retrying");
                    thread::sleep(backoff(self.config.retry_backoff, attempt));
                }
                Err(e) if e.is_retryable() => {
                    warn!(%position_id, attempt, "allocation retries exhausted");
                    return Err(DispatchError::LockTimeout(format!(
                        "gave up on position {position_id} after {attempt} retries"
                    )));
                }
                other => return other,
            }
        }
    }
}

fn backoff(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    let shift = attempt.saturating_sub(1).min(6);
    let delay = base.saturating_mul(1 << shift);
    delay.min(std::time::Duration::from_secs(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(25);
        assert_eq!(backoff(base, 1), Duration::from_millis(25));
        assert_eq!(backoff(base, 2), Duration::from_millis(50));
        assert_eq!(backoff(base, 3), Duration::from_millis(100));
        assert_eq!(backoff(base, 20), Duration::from_secs(2).min(base * 64));
    }
}
