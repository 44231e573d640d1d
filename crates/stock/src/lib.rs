//! Stock domain module (event-sourced).
//!
//! Business rules for lot-tracked inventory: receipt, quality, rotation-aware
//! allocation, fulfilment, transfers. Pure deterministic domain logic (no IO,
//! no HTTP, no storage).

pub mod allocation;
pub mod lot;
pub mod movement;
pub mod position;
pub mod rotation;
pub mod transfer;

pub use allocation::{Allocation, AllocationId, AllocationState, LotDraw};
pub use lot::{Lot, LotId, QualityStatus};
pub use movement::{Movement, MovementKind, movements_for};
pub use position::{
    AdjustLot, AllocateStock, AllocationPacked, AllocationPicked, AllocationReleased,
    CommitShipment, DispatchTransfer, LotAdjusted, LotQualityUpdated, LotReceived, LotWrittenOff,
    PackAllocation, PickAllocation, ReceiveLot, ReceiveTransfer, ReleaseAllocation, ReorderPolicy,
    ReorderPolicySet, SetReorderPolicy, ShipmentCommitted, StockAllocated, StockCommand,
    StockEvent, StockPosition, StockPositionId, TransferArrived, TransferDispatched,
    UpdateLotQuality, WriteOffLot,
};
pub use rotation::{RotationPolicy, eligible_in_rotation_order};
pub use transfer::{
    ApproveTransfer, MarkTransferReceived, MarkTransferShipped, MarkTransferStuck, RequestTransfer,
    Transfer, TransferApproved, TransferCommand, TransferEvent, TransferId, TransferReceived,
    TransferRequested, TransferShipped, TransferStatus, TransferStuck,
};
