use chrono::{DateTime, NaiveDate, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lotline_core::{DomainError, Entity};

/// Lot identifier (tenant-scoped via the owning stock position).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(Uuid);

impl LotId {
    /// Create a new identifier (UUIDv7, time-ordered).
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

impl Default for LotId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LotId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("LotId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Quality status of a lot.
///
/// `Failed` and `Quarantined` exclude the lot from allocation; `Failed` is
/// terminal, quarantine can be lifted by a subsequent inspection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    Pending,
    Passed,
    Failed,
    Quarantined,
}

impl QualityStatus {
    pub fn is_sellable(self) -> bool {
        matches!(self, QualityStatus::Pending | QualityStatus::Passed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QualityStatus::Failed)
    }
}

impl core::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            QualityStatus::Pending => "pending",
            QualityStatus::Passed => "passed",
            QualityStatus::Failed => "failed",
            QualityStatus::Quarantined => "quarantined",
        };
        f.write_str(s)
    }
}

/// A receipt batch of a SKU at a warehouse.
///
/// Invariant: `0 <= reserved_quantity <= current_quantity <= initial_quantity`.
/// Lots are never deleted, only zeroed, so the movement ledger always has a
/// target to reconcile against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    /// Sequential lot number, unique per SKU + warehouse position.
    pub lot_number: u32,
    pub initial_quantity: i64,
    pub current_quantity: i64,
    pub reserved_quantity: i64,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub quality: QualityStatus,
    pub bin_location: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Lot {
    /// Quantity not yet promised to any allocation.
    pub fn available(&self) -> i64 {
        self.current_quantity - self.reserved_quantity
    }

    /// Whether this lot may serve new allocations.
    pub fn is_eligible(&self) -> bool {
        self.quality.is_sellable() && self.available() > 0
    }
}

impl Entity for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
