//! Inter-warehouse transfer coordination.
//!
//! A transfer touches three streams: the transfer aggregate itself plus the
//! source and destination stock positions. There is no distributed
//! transaction; each leg is its own append, and a failed leg marks the
//! transfer stuck so an operator (or a retry) can resume. The inbound lot ID
//! is derived from the transfer ID, so a replayed receive leg is a no-op on
//! the destination position.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use lotline_core::{AggregateId, SkuId, TenantId, WarehouseId};
use lotline_events::{EventBus, EventEnvelope};
use lotline_stock::{
    ApproveTransfer, DispatchTransfer, LotId, MarkTransferReceived, MarkTransferShipped,
    MarkTransferStuck, ReceiveTransfer, RequestTransfer, StockCommand, StockEvent, StockPosition,
    StockPositionId, Transfer, TransferCommand, TransferId, TransferStatus,
};

use crate::allocation::STOCK_POSITION_AGGREGATE_TYPE;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

/// Aggregate type tag for transfer streams.
pub const TRANSFER_AGGREGATE_TYPE: &str = "stock.transfer";

/// Orchestrates the transfer lifecycle across aggregate streams.
#[derive(Debug)]
pub struct TransferCoordinator<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> TransferCoordinator<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Open a new transfer request.
    pub fn request(
        &self,
        tenant_id: TenantId,
        sku: SkuId,
        from_warehouse: WarehouseId,
        to_warehouse: WarehouseId,
        quantity: i64,
    ) -> Result<TransferId, DispatchError> {
        let transfer_id = TransferId::new(AggregateId::new());
        self.dispatch_transfer_command(
            tenant_id,
            transfer_id,
            TransferCommand::RequestTransfer(RequestTransfer {
                tenant_id,
                transfer_id,
                sku,
                from_warehouse,
                to_warehouse,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(transfer_id)
    }

    /// Approve a requested transfer.
    pub fn approve(&self, tenant_id: TenantId, transfer_id: TransferId) -> Result<(), DispatchError> {
        self.dispatch_transfer_command(
            tenant_id,
            transfer_id,
            TransferCommand::ApproveTransfer(ApproveTransfer {
                tenant_id,
                transfer_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Execute the physical legs of an approved (or stuck) transfer:
    /// dispatch from source, mark shipped, book into destination, mark
    /// received. Any failed leg marks the transfer stuck and surfaces the
    /// error; calling again resumes from the first incomplete leg.
    pub fn execute(&self, tenant_id: TenantId, transfer_id: TransferId) -> Result<(), DispatchError> {
        let transfer = self.rehydrate_transfer(tenant_id, transfer_id)?;
        let (sku, from_warehouse, to_warehouse) = transfer_route(&transfer)?;
        let quantity = transfer.quantity();

        match transfer.status() {
            TransferStatus::Received => return Ok(()),
            TransferStatus::Requested => {
                return Err(DispatchError::Validation(
                    "transfer must be approved before execution".to_string(),
                ));
            }
            TransferStatus::Approved | TransferStatus::Shipped | TransferStatus::Stuck => {}
        }

        let source_id = StockPositionId::derive(tenant_id, &sku, &from_warehouse);

        // Leg 1: draw stock out of the source position (skipped on resume).
        let dispatched = match self.find_dispatched(tenant_id, source_id, transfer_id)? {
            Some(found) => found,
            None => {
                let command = StockCommand::DispatchTransfer(DispatchTransfer {
                    tenant_id,
                    transfer_id,
                    to_warehouse: to_warehouse.clone(),
                    quantity,
                    occurred_at: Utc::now(),
                });
                match self.dispatcher.dispatch::<StockPosition>(
                    tenant_id,
                    source_id.0,
                    STOCK_POSITION_AGGREGATE_TYPE,
                    command,
                    |_, _| StockPosition::empty(source_id),
                ) {
                    Ok(_) => match self.find_dispatched(tenant_id, source_id, transfer_id)? {
                        Some(found) => found,
                        None => {
                            return Err(DispatchError::Store(
                                crate::event_store::EventStoreError::InvalidAppend(
                                    "dispatch committed no TransferDispatched event".to_string(),
                                ),
                            ));
                        }
                    },
                    Err(e) => {
                        warn!(%transfer_id, error = ?e, "transfer dispatch leg failed");
                        self.mark_stuck(tenant_id, transfer_id, format!("dispatch failed: {e:?}"));
                        return Err(e);
                    }
                }
            }
        };

        if transfer.status() != TransferStatus::Shipped {
            self.dispatch_transfer_command(
                tenant_id,
                transfer_id,
                TransferCommand::MarkTransferShipped(MarkTransferShipped {
                    tenant_id,
                    transfer_id,
                    occurred_at: Utc::now(),
                }),
            )?;
        }

        // Leg 2: book the stock into the destination as a fresh lot. The lot
        // ID is derived from the transfer ID, making this leg idempotent.
        let destination_id = StockPositionId::derive(tenant_id, &sku, &to_warehouse);
        let lot_id = inbound_lot_id(transfer_id);
        let receive = StockCommand::ReceiveTransfer(ReceiveTransfer {
            tenant_id,
            sku,
            warehouse: to_warehouse,
            transfer_id,
            from_warehouse,
            lot_id,
            quantity,
            expiration: dispatched.expiration,
            best_before: dispatched.best_before,
            occurred_at: Utc::now(),
        });

        if let Err(e) = self.dispatcher.dispatch::<StockPosition>(
            tenant_id,
            destination_id.0,
            STOCK_POSITION_AGGREGATE_TYPE,
            receive,
            |_, _| StockPosition::empty(destination_id),
        ) {
            warn!(%transfer_id, error = ?e, "transfer receive leg failed");
            self.mark_stuck(tenant_id, transfer_id, format!("receive failed: {e:?}"));
            return Err(e);
        }

        self.dispatch_transfer_command(
            tenant_id,
            transfer_id,
            TransferCommand::MarkTransferReceived(MarkTransferReceived {
                tenant_id,
                transfer_id,
                occurred_at: Utc::now(),
            }),
        )?;

        info!(%transfer_id, "transfer completed");
        Ok(())
    }

    /// Current aggregate state, for query paths.
    pub fn rehydrate_transfer(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
    ) -> Result<Transfer, DispatchError> {
        let transfer = self
            .dispatcher
            .rehydrate(tenant_id, transfer_id.0, |_, _| Transfer::empty(transfer_id))?;
        if transfer.tenant_id().is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(transfer)
    }

    fn dispatch_transfer_command(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        command: TransferCommand,
    ) -> Result<(), DispatchError> {
        self.dispatcher.dispatch::<Transfer>(
            tenant_id,
            transfer_id.0,
            TRANSFER_AGGREGATE_TYPE,
            command,
            |_, _| Transfer::empty(transfer_id),
        )?;
        Ok(())
    }

    /// Best-effort stuck marking after a failed leg; the original error wins.
    fn mark_stuck(&self, tenant_id: TenantId, transfer_id: TransferId, reason: String) {
        let result = self.dispatch_transfer_command(
            tenant_id,
            transfer_id,
            TransferCommand::MarkTransferStuck(MarkTransferStuck {
                tenant_id,
                transfer_id,
                reason,
                occurred_at: Utc::now(),
            }),
        );
        if let Err(e) = result {
            warn!(%transfer_id, error = ?e, "failed to mark transfer stuck");
        }
    }

    /// Look for an already-committed dispatch leg on the source stream.
    fn find_dispatched(
        &self,
        tenant_id: TenantId,
        source_id: StockPositionId,
        transfer_id: TransferId,
    ) -> Result<Option<DispatchedLeg>, DispatchError> {
        let stream = self.dispatcher.store().load_stream(tenant_id, source_id.0)?;
        for stored in &stream {
            if let Ok(StockEvent::TransferDispatched(e)) =
                serde_json::from_value::<StockEvent>(stored.payload.clone())
            {
                if e.transfer_id == transfer_id {
                    return Ok(Some(DispatchedLeg {
                        expiration: e.expiration,
                        best_before: e.best_before,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
struct DispatchedLeg {
    expiration: Option<NaiveDate>,
    best_before: Option<NaiveDate>,
}

fn transfer_route(
    transfer: &Transfer,
) -> Result<(SkuId, WarehouseId, WarehouseId), DispatchError> {
    match (transfer.sku(), transfer.from_warehouse(), transfer.to_warehouse()) {
        (Some(sku), Some(from), Some(to)) => Ok((sku.clone(), from.clone(), to.clone())),
        _ => Err(DispatchError::NotFound),
    }
}

/// Deterministic inbound lot ID so a replayed receive leg is idempotent.
fn inbound_lot_id(transfer_id: TransferId) -> LotId {
    LotId::from_uuid(Uuid::new_v5(transfer_id.0.as_uuid(), b"inbound-lot"))
}
