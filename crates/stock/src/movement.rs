//! Movement ledger entries derived from position events.
//!
//! The event stream is the source of truth; a `Movement` is a flattened,
//! per-lot view of one quantity change, suitable for ledger queries and for
//! reconciliation (summing deltas must reproduce the lot counters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationId;
use crate::lot::LotId;
use crate::position::StockEvent;
use crate::transfer::TransferId;

/// Kind of quantity movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Reservation,
    Release,
    Sale,
    Adjustment,
    WriteOff,
    TransferOut,
    TransferIn,
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Reservation => "reservation",
            MovementKind::Release => "release",
            MovementKind::Sale => "sale",
            MovementKind::Adjustment => "adjustment",
            MovementKind::WriteOff => "write_off",
            MovementKind::TransferOut => "transfer_out",
            MovementKind::TransferIn => "transfer_in",
        };
        f.write_str(s)
    }
}

/// One ledger line: a signed change to a lot's on-hand and reserved counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub lot_id: LotId,
    pub kind: MovementKind,
    pub on_hand_delta: i64,
    pub reserved_delta: i64,
    pub allocation_id: Option<AllocationId>,
    pub order_line_ref: Option<String>,
    pub transfer_id: Option<TransferId>,
    pub occurred_at: DateTime<Utc>,
}

impl Movement {
    fn quantity_only(
        lot_id: LotId,
        kind: MovementKind,
        on_hand_delta: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lot_id,
            kind,
            on_hand_delta,
            reserved_delta: 0,
            allocation_id: None,
            order_line_ref: None,
            transfer_id: None,
            occurred_at,
        }
    }
}

/// Flatten a position event into ledger lines, one per affected lot.
///
/// Pure state transitions (pick, pack, policy changes) produce no lines:
/// they move no quantity.
pub fn movements_for(event: &StockEvent) -> Vec<Movement> {
    match event {
        StockEvent::LotReceived(e) => vec![Movement::quantity_only(
            e.lot_id,
            MovementKind::Receipt,
            e.quantity,
            e.occurred_at,
        )],
        StockEvent::StockAllocated(e) => e
            .draws
            .iter()
            .map(|d| Movement {
                lot_id: d.lot_id,
                kind: MovementKind::Reservation,
                on_hand_delta: 0,
                reserved_delta: d.quantity,
                allocation_id: Some(e.allocation_id),
                order_line_ref: Some(e.order_line_ref.clone()),
                transfer_id: None,
                occurred_at: e.occurred_at,
            })
            .collect(),
        StockEvent::AllocationReleased(e) => e
            .draws
            .iter()
            .map(|d| Movement {
                lot_id: d.lot_id,
                kind: MovementKind::Release,
                on_hand_delta: 0,
                reserved_delta: -d.quantity,
                allocation_id: Some(e.allocation_id),
                order_line_ref: None,
                transfer_id: None,
                occurred_at: e.occurred_at,
            })
            .collect(),
        StockEvent::ShipmentCommitted(e) => e
            .draws
            .iter()
            .map(|d| Movement {
                lot_id: d.lot_id,
                kind: MovementKind::Sale,
                on_hand_delta: -d.quantity,
                reserved_delta: -d.quantity,
                allocation_id: Some(e.allocation_id),
                order_line_ref: Some(e.order_line_ref.clone()),
                transfer_id: None,
                occurred_at: e.occurred_at,
            })
            .collect(),
        StockEvent::LotAdjusted(e) => vec![Movement::quantity_only(
            e.lot_id,
            MovementKind::Adjustment,
            e.delta,
            e.occurred_at,
        )],
        StockEvent::LotWrittenOff(e) => vec![Movement::quantity_only(
            e.lot_id,
            MovementKind::WriteOff,
            -e.quantity,
            e.occurred_at,
        )],
        StockEvent::TransferDispatched(e) => e
            .draws
            .iter()
            .map(|d| Movement {
                lot_id: d.lot_id,
                kind: MovementKind::TransferOut,
                on_hand_delta: -d.quantity,
                reserved_delta: 0,
                allocation_id: None,
                order_line_ref: None,
                transfer_id: Some(e.transfer_id),
                occurred_at: e.occurred_at,
            })
            .collect(),
        StockEvent::TransferArrived(e) => vec![Movement {
            lot_id: e.lot_id,
            kind: MovementKind::TransferIn,
            on_hand_delta: e.quantity,
            reserved_delta: 0,
            allocation_id: None,
            order_line_ref: None,
            transfer_id: Some(e.transfer_id),
            occurred_at: e.occurred_at,
        }],
        StockEvent::LotQualityUpdated(_)
        | StockEvent::AllocationPicked(_)
        | StockEvent::AllocationPacked(_)
        | StockEvent::ReorderPolicySet(_) => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::LotDraw;
    use crate::position::{ShipmentCommitted, StockAllocated};
    use chrono::{TimeZone, Utc};
    use lotline_core::TenantId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn allocation_produces_one_reservation_line_per_draw() {
        let lot_a = LotId::new();
        let lot_b = LotId::new();
        let event = StockEvent::StockAllocated(StockAllocated {
            tenant_id: TenantId::new(),
            allocation_id: AllocationId::new(),
            order_line_ref: "SO-1/1".to_string(),
            requested_quantity: 30,
            draws: vec![
                LotDraw { lot_id: lot_a, quantity: 20 },
                LotDraw { lot_id: lot_b, quantity: 10 },
            ],
            partial: false,
            occurred_at: now(),
        });

        let lines = movements_for(&event);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|m| m.kind == MovementKind::Reservation));
        assert!(lines.iter().all(|m| m.on_hand_delta == 0));
        assert_eq!(lines.iter().map(|m| m.reserved_delta).sum::<i64>(), 30);
    }

    #[test]
    fn sale_decrements_both_counters() {
        let lot = LotId::new();
        let event = StockEvent::ShipmentCommitted(ShipmentCommitted {
            tenant_id: TenantId::new(),
            allocation_id: AllocationId::new(),
            order_line_ref: "SO-2/1".to_string(),
            draws: vec![LotDraw { lot_id: lot, quantity: 12 }],
            skipped_pick: false,
            occurred_at: now(),
        });

        let lines = movements_for(&event);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, MovementKind::Sale);
        assert_eq!(lines[0].on_hand_delta, -12);
        assert_eq!(lines[0].reserved_delta, -12);
        assert_eq!(lines[0].order_line_ref.as_deref(), Some("SO-2/1"));
    }
}
