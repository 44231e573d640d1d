use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lotline_core::{DomainError, Entity, ValueObject};

use crate::lot::LotId;

/// Allocation identifier, supplied by the caller so retries stay idempotent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(Uuid);

impl AllocationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AllocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AllocationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("AllocationId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// A quantity promised out of a specific lot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: i64,
}

impl ValueObject for LotDraw {}

/// Fulfilment state of an allocation.
///
/// `Allocated -> Picked -> Packed -> Shipped` is the happy path; `Released`
/// can be reached from any pre-shipment state. `Shipped` and `Released` are
/// terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    Allocated,
    Picked,
    Packed,
    Shipped,
    Released,
}

impl AllocationState {
    /// Still holding reservations against lots.
    pub fn is_active(self) -> bool {
        !matches!(self, AllocationState::Shipped | AllocationState::Released)
    }

    /// Past the pick step: stock is staged for shipment, not merely promised.
    pub fn is_committed(self) -> bool {
        matches!(self, AllocationState::Picked | AllocationState::Packed)
    }
}

impl core::fmt::Display for AllocationState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AllocationState::Allocated => "allocated",
            AllocationState::Picked => "picked",
            AllocationState::Packed => "packed",
            AllocationState::Shipped => "shipped",
            AllocationState::Released => "released",
        };
        f.write_str(s)
    }
}

/// A reservation of stock against a single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub order_line_ref: String,
    pub requested_quantity: i64,
    pub draws: Vec<LotDraw>,
    pub state: AllocationState,
    /// True when the draws cover less than the requested quantity.
    pub partial: bool,
}

impl Allocation {
    pub fn allocated_quantity(&self) -> i64 {
        self.draws.iter().map(|d| d.quantity).sum()
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
