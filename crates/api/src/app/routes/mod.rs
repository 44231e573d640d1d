pub mod advisor;
pub mod allocations;
pub mod lots;
pub mod movements;
pub mod stock;
pub mod system;
pub mod transfers;

use axum::response::Response;

use lotline_core::{SkuId, WarehouseId};

use super::errors::bad_request;

/// Validate SKU/warehouse strings into domain IDs, failing the request with a
/// 400 on empty input.
pub(crate) fn parse_position(sku: &str, warehouse: &str) -> Result<(SkuId, WarehouseId), Response> {
    let sku = SkuId::new(sku).map_err(|e| bad_request(&e.to_string()))?;
    let warehouse = WarehouseId::new(warehouse).map_err(|e| bad_request(&e.to_string()))?;
    Ok((sku, warehouse))
}
