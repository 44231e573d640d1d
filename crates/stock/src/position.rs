//! `StockPosition` — the aggregate serializing all quantity changes for one
//! SKU at one warehouse.
//!
//! Every movement of stock is an event on this aggregate's stream, so
//! stream-level optimistic concurrency is exactly the per-SKU/warehouse
//! serialization the allocation walk needs: two concurrent allocations of the
//! same position race on the append, the loser retries against fresh state.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lotline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, SkuId, TenantId, WarehouseId};
use lotline_events::Event;

use crate::allocation::{Allocation, AllocationId, AllocationState, LotDraw};
use crate::lot::{Lot, LotId, QualityStatus};
use crate::rotation::{RotationPolicy, eligible_in_rotation_order};
use crate::transfer::TransferId;

/// Namespace for deriving position stream IDs (UUIDv5).
const POSITION_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_746c_696e_6520_706f_7369_7469_6f6e);

/// Stock position identifier, derived deterministically from tenant + SKU +
/// warehouse so every writer addresses the same stream without a lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockPositionId(pub AggregateId);

impl StockPositionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn derive(tenant_id: TenantId, sku: &SkuId, warehouse: &WarehouseId) -> Self {
        let name = format!("{tenant_id}/{sku}/{warehouse}");
        Self(AggregateId::derived(&POSITION_NAMESPACE, name.as_bytes()))
    }
}

impl core::fmt::Display for StockPositionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Replenishment settings for a position, set by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub lead_time_days: u32,
    pub low_stock_threshold: i64,
    /// Default rotation for allocations that do not override it.
    pub rotation_policy: RotationPolicy,
}

/// Aggregate root: StockPosition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPosition {
    id: StockPositionId,
    tenant_id: Option<TenantId>,
    sku: Option<SkuId>,
    warehouse: Option<WarehouseId>,
    // BTreeMap over v7 lot IDs keeps iteration in receipt order.
    lots: BTreeMap<LotId, Lot>,
    allocations: HashMap<AllocationId, Allocation>,
    reorder_policy: Option<ReorderPolicy>,
    lots_received: u32,
    version: u64,
    created: bool,
}

impl StockPosition {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockPositionId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: None,
            warehouse: None,
            lots: BTreeMap::new(),
            allocations: HashMap::new(),
            reorder_policy: None,
            lots_received: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockPositionId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> Option<&SkuId> {
        self.sku.as_ref()
    }

    pub fn warehouse(&self) -> Option<&WarehouseId> {
        self.warehouse.as_ref()
    }

    pub fn lot(&self, id: &LotId) -> Option<&Lot> {
        self.lots.get(id)
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.values()
    }

    pub fn allocation(&self, id: &AllocationId) -> Option<&Allocation> {
        self.allocations.get(id)
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    pub fn reorder_policy(&self) -> Option<&ReorderPolicy> {
        self.reorder_policy.as_ref()
    }

    /// Total physical quantity across all lots, regardless of quality.
    pub fn on_hand_total(&self) -> i64 {
        self.lots.values().map(|l| l.current_quantity).sum()
    }

    /// Total quantity promised to active allocations.
    pub fn reserved_total(&self) -> i64 {
        self.lots.values().map(|l| l.reserved_quantity).sum()
    }

    /// Quantity a new allocation could draw: sellable lots, net of reservations.
    pub fn available_total(&self) -> i64 {
        self.lots
            .values()
            .filter(|l| l.quality.is_sellable())
            .map(Lot::available)
            .sum()
    }

    /// Reserved quantity that has already been picked or packed.
    pub fn committed_total(&self) -> i64 {
        self.allocations
            .values()
            .filter(|a| a.state.is_committed())
            .map(Allocation::allocated_quantity)
            .sum()
    }

    /// Rotation policy for a request: explicit override, then the position
    /// default, then FEFO.
    pub fn resolve_rotation(&self, requested: Option<RotationPolicy>) -> RotationPolicy {
        requested
            .or_else(|| self.reorder_policy.as_ref().map(|p| p.rotation_policy))
            .unwrap_or_default()
    }
}

impl AggregateRoot for StockPosition {
    type Id = StockPositionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub bin_location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLotQuality (inspection pass/fail, quarantine on/off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLotQuality {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub status: QualityStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub order_line_ref: String,
    pub quantity: i64,
    /// Per-request override of the position's default rotation.
    pub rotation_policy: Option<RotationPolicy>,
    /// When true, a shortfall produces a partial allocation instead of failing.
    pub allow_partial: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseAllocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAllocation {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PickAllocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickAllocation {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PackAllocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackAllocation {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitShipment, turning reservations into physical decrements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitShipment {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustLot (cycle count correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustLot {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOffLot (damage, expiry disposal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffLot {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DispatchTransfer, drawing stock out of this position for another
/// warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub to_warehouse: WarehouseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveTransfer, booking transferred stock into this position as a
/// fresh lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub transfer_id: TransferId,
    pub from_warehouse: WarehouseId,
    pub lot_id: LotId,
    pub quantity: i64,
    /// Inherited from the earliest-expiring source lot.
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetReorderPolicy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderPolicy {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub policy: ReorderPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    ReceiveLot(ReceiveLot),
    UpdateLotQuality(UpdateLotQuality),
    AllocateStock(AllocateStock),
    ReleaseAllocation(ReleaseAllocation),
    PickAllocation(PickAllocation),
    PackAllocation(PackAllocation),
    CommitShipment(CommitShipment),
    AdjustLot(AdjustLot),
    WriteOffLot(WriteOffLot),
    DispatchTransfer(DispatchTransfer),
    ReceiveTransfer(ReceiveTransfer),
    SetReorderPolicy(SetReorderPolicy),
}

/// Event: LotReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotReceived {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub lot_id: LotId,
    pub lot_number: u32,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub bin_location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotQualityUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotQualityUpdated {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub status: QualityStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub order_line_ref: String,
    pub requested_quantity: i64,
    pub draws: Vec<LotDraw>,
    pub partial: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReleased {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub draws: Vec<LotDraw>,
    /// True when released after pick/pack, so projections can unwind the
    /// committed counter as well.
    pub was_committed: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationPicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPicked {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub draws: Vec<LotDraw>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationPacked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPacked {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentCommitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCommitted {
    pub tenant_id: TenantId,
    pub allocation_id: AllocationId,
    pub order_line_ref: String,
    pub draws: Vec<LotDraw>,
    /// True when the allocation shipped straight from `Allocated` without a
    /// recorded pick.
    pub skipped_pick: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAdjusted {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotWrittenOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotWrittenOff {
    pub tenant_id: TenantId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferDispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDispatched {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub to_warehouse: WarehouseId,
    pub draws: Vec<LotDraw>,
    /// Earliest expiration among the drawn lots, carried to the destination.
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferArrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArrived {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub transfer_id: TransferId,
    pub from_warehouse: WarehouseId,
    pub lot_id: LotId,
    pub lot_number: u32,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderPolicySet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicySet {
    pub tenant_id: TenantId,
    pub sku: SkuId,
    pub warehouse: WarehouseId,
    pub policy: ReorderPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    LotReceived(LotReceived),
    LotQualityUpdated(LotQualityUpdated),
    StockAllocated(StockAllocated),
    AllocationReleased(AllocationReleased),
    AllocationPicked(AllocationPicked),
    AllocationPacked(AllocationPacked),
    ShipmentCommitted(ShipmentCommitted),
    LotAdjusted(LotAdjusted),
    LotWrittenOff(LotWrittenOff),
    TransferDispatched(TransferDispatched),
    TransferArrived(TransferArrived),
    ReorderPolicySet(ReorderPolicySet),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::LotReceived(_) => "stock.lot.received",
            StockEvent::LotQualityUpdated(_) => "stock.lot.quality_updated",
            StockEvent::StockAllocated(_) => "stock.allocation.created",
            StockEvent::AllocationReleased(_) => "stock.allocation.released",
            StockEvent::AllocationPicked(_) => "stock.allocation.picked",
            StockEvent::AllocationPacked(_) => "stock.allocation.packed",
            StockEvent::ShipmentCommitted(_) => "stock.allocation.shipped",
            StockEvent::LotAdjusted(_) => "stock.lot.adjusted",
            StockEvent::LotWrittenOff(_) => "stock.lot.written_off",
            StockEvent::TransferDispatched(_) => "stock.transfer.dispatched",
            StockEvent::TransferArrived(_) => "stock.transfer.arrived",
            StockEvent::ReorderPolicySet(_) => "stock.reorder_policy.set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::LotReceived(e) => e.occurred_at,
            StockEvent::LotQualityUpdated(e) => e.occurred_at,
            StockEvent::StockAllocated(e) => e.occurred_at,
            StockEvent::AllocationReleased(e) => e.occurred_at,
            StockEvent::AllocationPicked(e) => e.occurred_at,
            StockEvent::AllocationPacked(e) => e.occurred_at,
            StockEvent::ShipmentCommitted(e) => e.occurred_at,
            StockEvent::LotAdjusted(e) => e.occurred_at,
            StockEvent::LotWrittenOff(e) => e.occurred_at,
            StockEvent::TransferDispatched(e) => e.occurred_at,
            StockEvent::TransferArrived(e) => e.occurred_at,
            StockEvent::ReorderPolicySet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockPosition {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::LotReceived(e) => {
                self.establish(e.tenant_id, &e.sku, &e.warehouse);
                self.lots_received = self.lots_received.max(e.lot_number);
                self.lots.insert(
                    e.lot_id,
                    Lot {
                        id: e.lot_id,
                        lot_number: e.lot_number,
                        initial_quantity: e.quantity,
                        current_quantity: e.quantity,
                        reserved_quantity: 0,
                        expiration: e.expiration,
                        best_before: e.best_before,
                        quality: QualityStatus::Pending,
                        bin_location: e.bin_location.clone(),
                        received_at: e.occurred_at,
                    },
                );
            }
            StockEvent::LotQualityUpdated(e) => {
                if let Some(lot) = self.lots.get_mut(&e.lot_id) {
                    lot.quality = e.status;
                }
            }
            StockEvent::StockAllocated(e) => {
                for draw in &e.draws {
                    if let Some(lot) = self.lots.get_mut(&draw.lot_id) {
                        lot.reserved_quantity += draw.quantity;
                    }
                }
                self.allocations.insert(
                    e.allocation_id,
                    Allocation {
                        id: e.allocation_id,
                        order_line_ref: e.order_line_ref.clone(),
                        requested_quantity: e.requested_quantity,
                        draws: e.draws.clone(),
                        state: AllocationState::Allocated,
                        partial: e.partial,
                    },
                );
            }
            StockEvent::AllocationReleased(e) => {
                for draw in &e.draws {
                    if let Some(lot) = self.lots.get_mut(&draw.lot_id) {
                        lot.reserved_quantity -= draw.quantity;
                    }
                }
                if let Some(alloc) = self.allocations.get_mut(&e.allocation_id) {
                    alloc.state = AllocationState::Released;
                }
            }
            StockEvent::AllocationPicked(e) => {
                if let Some(alloc) = self.allocations.get_mut(&e.allocation_id) {
                    alloc.state = AllocationState::Picked;
                }
            }
            StockEvent::AllocationPacked(e) => {
                if let Some(alloc) = self.allocations.get_mut(&e.allocation_id) {
                    alloc.state = AllocationState::Packed;
                }
            }
            StockEvent::ShipmentCommitted(e) => {
                for draw in &e.draws {
                    if let Some(lot) = self.lots.get_mut(&draw.lot_id) {
                        lot.current_quantity -= draw.quantity;
                        lot.reserved_quantity -= draw.quantity;
                    }
                }
                if let Some(alloc) = self.allocations.get_mut(&e.allocation_id) {
                    alloc.state = AllocationState::Shipped;
                }
            }
            StockEvent::LotAdjusted(e) => {
                if let Some(lot) = self.lots.get_mut(&e.lot_id) {
                    lot.current_quantity += e.delta;
                    // Found stock raises the receipt baseline too, keeping
                    // current <= initial.
                    if e.delta > 0 {
                        lot.initial_quantity += e.delta;
                    }
                }
            }
            StockEvent::LotWrittenOff(e) => {
                if let Some(lot) = self.lots.get_mut(&e.lot_id) {
                    lot.current_quantity -= e.quantity;
                }
            }
            StockEvent::TransferDispatched(e) => {
                for draw in &e.draws {
                    if let Some(lot) = self.lots.get_mut(&draw.lot_id) {
                        lot.current_quantity -= draw.quantity;
                    }
                }
            }
            StockEvent::TransferArrived(e) => {
                self.establish(e.tenant_id, &e.sku, &e.warehouse);
                self.lots_received = self.lots_received.max(e.lot_number);
                self.lots.insert(
                    e.lot_id,
                    Lot {
                        id: e.lot_id,
                        lot_number: e.lot_number,
                        initial_quantity: e.quantity,
                        current_quantity: e.quantity,
                        reserved_quantity: 0,
                        expiration: e.expiration,
                        best_before: e.best_before,
                        // Transferred stock was inspected at the source.
                        quality: QualityStatus::Passed,
                        bin_location: None,
                        received_at: e.occurred_at,
                    },
                );
            }
            StockEvent::ReorderPolicySet(e) => {
                self.establish(e.tenant_id, &e.sku, &e.warehouse);
                self.reorder_policy = Some(e.policy.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::ReceiveLot(cmd) => self.handle_receive(cmd),
            StockCommand::UpdateLotQuality(cmd) => self.handle_quality(cmd),
            StockCommand::AllocateStock(cmd) => self.handle_allocate(cmd),
            StockCommand::ReleaseAllocation(cmd) => self.handle_release(cmd),
            StockCommand::PickAllocation(cmd) => self.handle_pick(cmd),
            StockCommand::PackAllocation(cmd) => self.handle_pack(cmd),
            StockCommand::CommitShipment(cmd) => self.handle_commit(cmd),
            StockCommand::AdjustLot(cmd) => self.handle_adjust(cmd),
            StockCommand::WriteOffLot(cmd) => self.handle_write_off(cmd),
            StockCommand::DispatchTransfer(cmd) => self.handle_dispatch(cmd),
            StockCommand::ReceiveTransfer(cmd) => self.handle_transfer_in(cmd),
            StockCommand::SetReorderPolicy(cmd) => self.handle_set_policy(cmd),
        }
    }
}

impl StockPosition {
    fn establish(&mut self, tenant_id: TenantId, sku: &SkuId, warehouse: &WarehouseId) {
        if !self.created {
            self.tenant_id = Some(tenant_id);
            self.sku = Some(sku.clone());
            self.warehouse = Some(warehouse.clone());
            self.created = true;
        }
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_position(&self, sku: &SkuId, warehouse: &WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.sku.as_ref() != Some(sku) || self.warehouse.as_ref() != Some(warehouse) {
            return Err(DomainError::invariant("sku/warehouse mismatch for position"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::unknown_sku(
                "no stock recorded for this SKU at this warehouse",
            ));
        }
        Ok(())
    }

    fn lot_or_unknown(&self, lot_id: &LotId) -> Result<&Lot, DomainError> {
        self.lots
            .get(lot_id)
            .ok_or_else(|| DomainError::unknown_lot(lot_id.to_string()))
    }

    fn allocation_or_not_found(&self, id: &AllocationId) -> Result<&Allocation, DomainError> {
        self.allocations
            .get(id)
            .ok_or_else(|| DomainError::not_found())
    }

    /// Greedy draw plan over eligible lots in rotation order.
    fn plan_draws(&self, quantity: i64, policy: RotationPolicy) -> Vec<LotDraw> {
        let mut remaining = quantity;
        let mut draws = Vec::new();
        for lot in eligible_in_rotation_order(self.lots.values(), policy) {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(lot.available());
            draws.push(LotDraw {
                lot_id: lot.id,
                quantity: take,
            });
            remaining -= take;
        }
        draws
    }

    fn handle_receive(&self, cmd: &ReceiveLot) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_position(&cmd.sku, &cmd.warehouse)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "received quantity must be positive",
            ));
        }
        if self.lots.contains_key(&cmd.lot_id) {
            return Err(DomainError::conflict("lot already received"));
        }
        Ok(vec![StockEvent::LotReceived(LotReceived {
            tenant_id: cmd.tenant_id,
            sku: cmd.sku.clone(),
            warehouse: cmd.warehouse.clone(),
            lot_id: cmd.lot_id,
            lot_number: self.lots_received + 1,
            quantity: cmd.quantity,
            expiration: cmd.expiration,
            best_before: cmd.best_before,
            bin_location: cmd.bin_location.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_quality(&self, cmd: &UpdateLotQuality) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let lot = self.lot_or_unknown(&cmd.lot_id)?;

        if lot.quality == cmd.status {
            // Idempotent repeat of the same verdict.
            return Ok(vec![]);
        }
        if lot.quality.is_terminal() {
            return Err(DomainError::conflict("lot has terminally failed inspection"));
        }
        if cmd.status == QualityStatus::Pending {
            return Err(DomainError::validation("cannot return a lot to pending"));
        }

        Ok(vec![StockEvent::LotQualityUpdated(LotQualityUpdated {
            tenant_id: cmd.tenant_id,
            lot_id: cmd.lot_id,
            status: cmd.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "allocation quantity must be positive",
            ));
        }
        if cmd.order_line_ref.trim().is_empty() {
            return Err(DomainError::validation("order_line_ref cannot be empty"));
        }
        if self.allocations.contains_key(&cmd.allocation_id) {
            return Err(DomainError::conflict("allocation already exists"));
        }

        let policy = self.resolve_rotation(cmd.rotation_policy);
        let draws = self.plan_draws(cmd.quantity, policy);
        let drawn: i64 = draws.iter().map(|d| d.quantity).sum();

        if drawn == 0 || (drawn < cmd.quantity && !cmd.allow_partial) {
            return Err(DomainError::insufficient_stock(
                cmd.quantity,
                self.available_total(),
            ));
        }

        Ok(vec![StockEvent::StockAllocated(StockAllocated {
            tenant_id: cmd.tenant_id,
            allocation_id: cmd.allocation_id,
            order_line_ref: cmd.order_line_ref.clone(),
            requested_quantity: cmd.quantity,
            partial: drawn < cmd.quantity,
            draws,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseAllocation) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let alloc = self.allocation_or_not_found(&cmd.allocation_id)?;

        if !alloc.state.is_active() {
            // Releasing a shipped or already-released allocation is a no-op.
            return Ok(vec![]);
        }

        Ok(vec![StockEvent::AllocationReleased(AllocationReleased {
            tenant_id: cmd.tenant_id,
            allocation_id: cmd.allocation_id,
            draws: alloc.draws.clone(),
            was_committed: alloc.state.is_committed(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pick(&self, cmd: &PickAllocation) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let alloc = self.allocation_or_not_found(&cmd.allocation_id)?;

        match alloc.state {
            AllocationState::Allocated => Ok(vec![StockEvent::AllocationPicked(AllocationPicked {
                tenant_id: cmd.tenant_id,
                allocation_id: cmd.allocation_id,
                draws: alloc.draws.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            AllocationState::Picked => Ok(vec![]),
            state => Err(DomainError::conflict(format!(
                "cannot pick allocation in state '{state}'"
            ))),
        }
    }

    fn handle_pack(&self, cmd: &PackAllocation) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let alloc = self.allocation_or_not_found(&cmd.allocation_id)?;

        match alloc.state {
            AllocationState::Picked => Ok(vec![StockEvent::AllocationPacked(AllocationPacked {
                tenant_id: cmd.tenant_id,
                allocation_id: cmd.allocation_id,
                occurred_at: cmd.occurred_at,
            })]),
            AllocationState::Packed => Ok(vec![]),
            state => Err(DomainError::conflict(format!(
                "cannot pack allocation in state '{state}'"
            ))),
        }
    }

    fn handle_commit(&self, cmd: &CommitShipment) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let alloc = self.allocation_or_not_found(&cmd.allocation_id)?;

        match alloc.state {
            AllocationState::Shipped => Ok(vec![]),
            AllocationState::Released => {
                Err(DomainError::conflict("allocation was released, nothing to ship"))
            }
            state => Ok(vec![StockEvent::ShipmentCommitted(ShipmentCommitted {
                tenant_id: cmd.tenant_id,
                allocation_id: cmd.allocation_id,
                order_line_ref: alloc.order_line_ref.clone(),
                draws: alloc.draws.clone(),
                skipped_pick: state == AllocationState::Allocated,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_adjust(&self, cmd: &AdjustLot) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let lot = self.lot_or_unknown(&cmd.lot_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::invalid_quantity("adjustment delta cannot be zero"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason cannot be empty"));
        }
        if lot.current_quantity + cmd.delta < lot.reserved_quantity {
            return Err(DomainError::invalid_quantity(
                "adjustment would drop lot below its reserved quantity",
            ));
        }

        Ok(vec![StockEvent::LotAdjusted(LotAdjusted {
            tenant_id: cmd.tenant_id,
            lot_id: cmd.lot_id,
            delta: cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffLot) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        let lot = self.lot_or_unknown(&cmd.lot_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "write-off quantity must be positive",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("write-off reason cannot be empty"));
        }
        if cmd.quantity > lot.available() {
            return Err(DomainError::invalid_quantity(
                "cannot write off reserved or absent stock",
            ));
        }

        Ok(vec![StockEvent::LotWrittenOff(LotWrittenOff {
            tenant_id: cmd.tenant_id,
            lot_id: cmd.lot_id,
            quantity: cmd.quantity,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_dispatch(&self, cmd: &DispatchTransfer) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "transfer quantity must be positive",
            ));
        }
        if self.warehouse.as_ref() == Some(&cmd.to_warehouse) {
            return Err(DomainError::validation(
                "transfer source and destination warehouses must differ",
            ));
        }

        let policy = self.resolve_rotation(None);
        let draws = self.plan_draws(cmd.quantity, policy);
        let drawn: i64 = draws.iter().map(|d| d.quantity).sum();
        if drawn < cmd.quantity {
            return Err(DomainError::insufficient_stock(
                cmd.quantity,
                self.available_total(),
            ));
        }

        // Destination inherits the earliest expiration among drawn lots.
        let expiration = draws
            .iter()
            .filter_map(|d| self.lots.get(&d.lot_id).and_then(|l| l.expiration))
            .min();
        let best_before = draws
            .iter()
            .filter_map(|d| self.lots.get(&d.lot_id).and_then(|l| l.best_before))
            .min();

        Ok(vec![StockEvent::TransferDispatched(TransferDispatched {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            to_warehouse: cmd.to_warehouse.clone(),
            draws,
            expiration,
            best_before,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transfer_in(&self, cmd: &ReceiveTransfer) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_position(&cmd.sku, &cmd.warehouse)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "transfer quantity must be positive",
            ));
        }
        if cmd.from_warehouse == cmd.warehouse {
            return Err(DomainError::validation(
                "transfer source and destination warehouses must differ",
            ));
        }
        if self.lots.contains_key(&cmd.lot_id) {
            // The coordinator retried a delivery that already landed.
            return Ok(vec![]);
        }

        Ok(vec![StockEvent::TransferArrived(TransferArrived {
            tenant_id: cmd.tenant_id,
            sku: cmd.sku.clone(),
            warehouse: cmd.warehouse.clone(),
            transfer_id: cmd.transfer_id,
            from_warehouse: cmd.from_warehouse.clone(),
            lot_id: cmd.lot_id,
            lot_number: self.lots_received + 1,
            quantity: cmd.quantity,
            expiration: cmd.expiration,
            best_before: cmd.best_before,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_policy(&self, cmd: &SetReorderPolicy) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_position(&cmd.sku, &cmd.warehouse)?;
        let p = &cmd.policy;
        if p.reorder_point < 0 || p.low_stock_threshold < 0 {
            return Err(DomainError::validation(
                "reorder point and low-stock threshold cannot be negative",
            ));
        }
        if p.reorder_quantity <= 0 {
            return Err(DomainError::validation("reorder quantity must be positive"));
        }

        Ok(vec![StockEvent::ReorderPolicySet(ReorderPolicySet {
            tenant_id: cmd.tenant_id,
            sku: cmd.sku.clone(),
            warehouse: cmd.warehouse.clone(),
            policy: cmd.policy.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
