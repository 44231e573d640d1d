//! Request/response shapes for the HTTP surface.
//!
//! Identifier fields arrive as plain strings and are validated into domain
//! newtypes in the handlers, so malformed input fails with a 400 before any
//! command is dispatched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lotline_stock::{AllocationState, LotDraw, QualityStatus, RotationPolicy};

fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize)]
pub struct ReceiveLotRequest {
    pub sku: String,
    pub warehouse: String,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
    pub best_before: Option<NaiveDate>,
    pub bin_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InspectLotRequest {
    pub sku: String,
    pub warehouse: String,
    pub status: QualityStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuarantineLotRequest {
    pub sku: String,
    pub warehouse: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustLotRequest {
    pub sku: String,
    pub warehouse: String,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffLotRequest {
    pub sku: String,
    pub warehouse: String,
    pub quantity: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AllocateStockRequest {
    pub sku: String,
    /// Omit to let the service resolve a warehouse from the stock read model.
    pub warehouse: Option<String>,
    pub quantity: i64,
    pub order_line_ref: String,
    pub rotation_policy: Option<RotationPolicy>,
    #[serde(default = "default_false")]
    pub allow_partial: bool,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub allocation_id: Uuid,
    pub state: AllocationState,
    pub warehouse: String,
    pub draws: Vec<LotDraw>,
    pub partial: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetReorderPolicyRequest {
    pub sku: String,
    pub warehouse: String,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub lead_time_days: u32,
    pub low_stock_threshold: i64,
    #[serde(default)]
    pub rotation_policy: RotationPolicy,
}

#[derive(Debug, Deserialize)]
pub struct RequestTransferRequest {
    pub sku: String,
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    /// Provide both to reconcile a single position; omit for the whole tenant.
    pub sku: Option<String>,
    pub warehouse: Option<String>,
    #[serde(default = "default_false")]
    pub repair: bool,
}

/// Query string for SKU/warehouse-scoped read endpoints.
#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    pub sku: String,
    pub warehouse: String,
}
