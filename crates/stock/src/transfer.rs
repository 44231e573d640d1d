//! Inter-warehouse transfer lifecycle.
//!
//! A `Transfer` tracks the paperwork; the quantity itself moves on the two
//! stock positions (`TransferDispatched` at the source, `TransferArrived` at
//! the destination). The coordinator in the infrastructure layer keeps the
//! three streams in step and marks a transfer stuck when it cannot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, SkuId, TenantId, WarehouseId};
use lotline_events::Event;

/// Transfer identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Transfer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Requested,
    Approved,
    Shipped,
    Received,
    Stuck,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    id: TransferId,
    tenant_id: Option<TenantId>,
    sku: Option<SkuId>,
    from_warehouse: Option<WarehouseId>,
    to_warehouse: Option<WarehouseId>,
    quantity: i64,
    status: TransferStatus,
    stuck_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Transfer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: None,
            from_warehouse: None,
            to_warehouse: None,
            quantity: 0,
            status: TransferStatus::Requested,
            stuck_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> Option<&SkuId> {
        self.sku.as_ref()
    }

    pub fn from_warehouse(&self) -> Option<&WarehouseId> {
        self.from_warehouse.as_ref()
    }

    pub fn to_warehouse(&self) -> Option<&WarehouseId> {
        self.to_warehouse.as_ref()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn stuck_reason(&self) -> Option<&str> {
        self.stuck_reason.as_deref()
    }

    /// Quantity still travelling between warehouses.
    pub fn is_in_transit(&self) -> bool {
        matches!(self.status, TransferStatus::Shipped)
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub sku: SkuId,
    pub from_warehouse: WarehouseId,
    pub to_warehouse: WarehouseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkTransferShipped: the source position accepted the dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTransferShipped {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkTransferReceived: the destination position booked the stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkTransferStuck: a leg failed and needs operator attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTransferStuck {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    RequestTransfer(RequestTransfer),
    ApproveTransfer(ApproveTransfer),
    MarkTransferShipped(MarkTransferShipped),
    MarkTransferReceived(MarkTransferReceived),
    MarkTransferStuck(MarkTransferStuck),
}

/// Event: TransferRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequested {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub sku: SkuId,
    pub from_warehouse: WarehouseId,
    pub to_warehouse: WarehouseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferApproved {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferShipped {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferStuck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStuck {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferRequested(TransferRequested),
    TransferApproved(TransferApproved),
    TransferShipped(TransferShipped),
    TransferReceived(TransferReceived),
    TransferStuck(TransferStuck),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferRequested(_) => "transfer.requested",
            TransferEvent::TransferApproved(_) => "transfer.approved",
            TransferEvent::TransferShipped(_) => "transfer.shipped",
            TransferEvent::TransferReceived(_) => "transfer.received",
            TransferEvent::TransferStuck(_) => "transfer.stuck",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferRequested(e) => e.occurred_at,
            TransferEvent::TransferApproved(e) => e.occurred_at,
            TransferEvent::TransferShipped(e) => e.occurred_at,
            TransferEvent::TransferReceived(e) => e.occurred_at,
            TransferEvent::TransferStuck(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferRequested(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = Some(e.sku.clone());
                self.from_warehouse = Some(e.from_warehouse.clone());
                self.to_warehouse = Some(e.to_warehouse.clone());
                self.quantity = e.quantity;
                self.status = TransferStatus::Requested;
                self.created = true;
            }
            TransferEvent::TransferApproved(_) => {
                self.status = TransferStatus::Approved;
            }
            TransferEvent::TransferShipped(_) => {
                self.status = TransferStatus::Shipped;
                self.stuck_reason = None;
            }
            TransferEvent::TransferReceived(_) => {
                self.status = TransferStatus::Received;
                self.stuck_reason = None;
            }
            TransferEvent::TransferStuck(e) => {
                self.status = TransferStatus::Stuck;
                self.stuck_reason = Some(e.reason.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::RequestTransfer(cmd) => self.handle_request(cmd),
            TransferCommand::ApproveTransfer(cmd) => self.handle_approve(cmd),
            TransferCommand::MarkTransferShipped(cmd) => self.handle_shipped(cmd),
            TransferCommand::MarkTransferReceived(cmd) => self.handle_received(cmd),
            TransferCommand::MarkTransferStuck(cmd) => self.handle_stuck(cmd),
        }
    }
}

impl Transfer {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(
                "transfer quantity must be positive",
            ));
        }
        if cmd.from_warehouse == cmd.to_warehouse {
            return Err(DomainError::validation(
                "transfer source and destination warehouses must differ",
            ));
        }
        Ok(vec![TransferEvent::TransferRequested(TransferRequested {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            sku: cmd.sku.clone(),
            from_warehouse: cmd.from_warehouse.clone(),
            to_warehouse: cmd.to_warehouse.clone(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        match self.status {
            TransferStatus::Requested => Ok(vec![TransferEvent::TransferApproved(TransferApproved {
                tenant_id: cmd.tenant_id,
                transfer_id: cmd.transfer_id,
                occurred_at: cmd.occurred_at,
            })]),
            TransferStatus::Approved => Ok(vec![]),
            _ => Err(DomainError::invariant(
                "only a requested transfer can be approved",
            )),
        }
    }

    fn handle_shipped(&self, cmd: &MarkTransferShipped) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        match self.status {
            // A stuck transfer moves back through shipped on resume, once the
            // coordinator has confirmed the dispatch leg on the source stream.
            TransferStatus::Approved | TransferStatus::Stuck => {
                Ok(vec![TransferEvent::TransferShipped(TransferShipped {
                    tenant_id: cmd.tenant_id,
                    transfer_id: cmd.transfer_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransferStatus::Shipped => Ok(vec![]),
            _ => Err(DomainError::invariant(
                "only an approved transfer can be shipped",
            )),
        }
    }

    fn handle_received(
        &self,
        cmd: &MarkTransferReceived,
    ) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        match self.status {
            // Stuck transfers can be closed out manually after the operator
            // reconciles the positions.
            TransferStatus::Shipped | TransferStatus::Stuck => {
                Ok(vec![TransferEvent::TransferReceived(TransferReceived {
                    tenant_id: cmd.tenant_id,
                    transfer_id: cmd.transfer_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransferStatus::Received => Ok(vec![]),
            _ => Err(DomainError::invariant(
                "only a shipped transfer can be received",
            )),
        }
    }

    fn handle_stuck(&self, cmd: &MarkTransferStuck) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("stuck reason cannot be empty"));
        }
        match self.status {
            TransferStatus::Received => {
                Err(DomainError::invariant("a received transfer cannot get stuck"))
            }
            _ => Ok(vec![TransferEvent::TransferStuck(TransferStuck {
                tenant_id: cmd.tenant_id,
                transfer_id: cmd.transfer_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
    }

    fn request(tenant_id: TenantId, transfer_id: TransferId) -> TransferCommand {
        TransferCommand::RequestTransfer(RequestTransfer {
            tenant_id,
            transfer_id,
            sku: SkuId::new("SKU-1").unwrap(),
            from_warehouse: WarehouseId::new("WH-A").unwrap(),
            to_warehouse: WarehouseId::new("WH-B").unwrap(),
            quantity: 25,
            occurred_at: now(),
        })
    }

    fn drive(transfer: &mut Transfer, cmd: TransferCommand) -> Result<Vec<TransferEvent>, DomainError> {
        let events = transfer.handle(&cmd)?;
        for e in &events {
            transfer.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn full_lifecycle_reaches_received() {
        let tenant_id = TenantId::new();
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = Transfer::empty(transfer_id);

        drive(&mut transfer, request(tenant_id, transfer_id)).unwrap();
        drive(
            &mut transfer,
            TransferCommand::ApproveTransfer(ApproveTransfer {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        drive(
            &mut transfer,
            TransferCommand::MarkTransferShipped(MarkTransferShipped {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(transfer.is_in_transit());

        drive(
            &mut transfer,
            TransferCommand::MarkTransferReceived(MarkTransferReceived {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Received);
        assert!(!transfer.is_in_transit());
    }

    #[test]
    fn cannot_ship_before_approval() {
        let tenant_id = TenantId::new();
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = Transfer::empty(transfer_id);
        drive(&mut transfer, request(tenant_id, transfer_id)).unwrap();

        let err = drive(
            &mut transfer,
            TransferCommand::MarkTransferShipped(MarkTransferShipped {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn stuck_transfer_can_be_manually_received() {
        let tenant_id = TenantId::new();
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = Transfer::empty(transfer_id);
        drive(&mut transfer, request(tenant_id, transfer_id)).unwrap();
        drive(
            &mut transfer,
            TransferCommand::ApproveTransfer(ApproveTransfer {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        drive(
            &mut transfer,
            TransferCommand::MarkTransferStuck(MarkTransferStuck {
                tenant_id,
                transfer_id,
                reason: "source dispatch failed".to_string(),
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Stuck);
        assert_eq!(transfer.stuck_reason(), Some("source dispatch failed"));

        drive(
            &mut transfer,
            TransferCommand::MarkTransferReceived(MarkTransferReceived {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Received);
        assert_eq!(transfer.stuck_reason(), None);
    }

    #[test]
    fn stuck_transfer_resumes_through_shipped() {
        let tenant_id = TenantId::new();
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = Transfer::empty(transfer_id);
        drive(&mut transfer, request(tenant_id, transfer_id)).unwrap();
        drive(
            &mut transfer,
            TransferCommand::ApproveTransfer(ApproveTransfer {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        drive(
            &mut transfer,
            TransferCommand::MarkTransferStuck(MarkTransferStuck {
                tenant_id,
                transfer_id,
                reason: "dispatch failed".to_string(),
                occurred_at: now(),
            }),
        )
        .unwrap();

        drive(
            &mut transfer,
            TransferCommand::MarkTransferShipped(MarkTransferShipped {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Shipped);
        assert_eq!(transfer.stuck_reason(), None);

        drive(
            &mut transfer,
            TransferCommand::MarkTransferReceived(MarkTransferReceived {
                tenant_id,
                transfer_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Received);
    }

    #[test]
    fn same_warehouse_transfer_is_rejected() {
        let tenant_id = TenantId::new();
        let transfer_id = TransferId::new(AggregateId::new());
        let transfer = Transfer::empty(transfer_id);

        let err = transfer
            .handle(&TransferCommand::RequestTransfer(RequestTransfer {
                tenant_id,
                transfer_id,
                sku: SkuId::new("SKU-1").unwrap(),
                from_warehouse: WarehouseId::new("WH-A").unwrap(),
                to_warehouse: WarehouseId::new("WH-A").unwrap(),
                quantity: 5,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
