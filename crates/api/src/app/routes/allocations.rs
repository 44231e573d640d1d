//! Allocation lifecycle routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use uuid::Uuid;

use lotline_core::{TenantId, WarehouseId};
use lotline_infra::allocation::AllocateRequest;
use lotline_stock::{AllocationId, AllocationState};

use crate::app::dto::{AllocateStockRequest, AllocationResponse};
use crate::app::errors::{bad_request, dispatch_error_response};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/allocations", post(allocate))
        .route("/allocations/:allocation_id", get(get_allocation))
        .route("/allocations/:allocation_id/release", post(release))
        .route("/allocations/:allocation_id/pick", post(pick))
        .route("/allocations/:allocation_id/pack", post(pack))
        .route(
            "/allocations/:allocation_id/commit-shipment",
            post(commit_shipment),
        )
}

async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<AllocateStockRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();

    let sku = match lotline_core::SkuId::new(&body.sku) {
        Ok(s) => s,
        Err(e) => return bad_request(&e.to_string()),
    };
    let warehouse = match body.warehouse.as_deref() {
        Some(w) => match WarehouseId::new(w) {
            Ok(w) => Some(w),
            Err(e) => return bad_request(&e.to_string()),
        },
        None => None,
    };

    let request = AllocateRequest {
        sku,
        warehouse,
        quantity: body.quantity,
        order_line_ref: body.order_line_ref,
        rotation_policy: body.rotation_policy,
        allow_partial: body.allow_partial,
    };

    match services.allocation().allocate(tenant_id, request) {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(AllocationResponse {
                allocation_id: *outcome.allocation_id.as_uuid(),
                state: AllocationState::Allocated,
                warehouse: outcome.warehouse.as_str().to_string(),
                draws: outcome.draws,
                partial: outcome.partial,
            }),
        )
            .into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

/// Post-transition state, read back from the stream.
fn state_response(
    services: &AppServices,
    tenant_id: TenantId,
    allocation_id: AllocationId,
) -> Response {
    match services.allocation().allocation(tenant_id, allocation_id) {
        Ok(allocation) => Json(json!({ "state": allocation.state })).into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn get_allocation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(allocation_id): Path<Uuid>,
) -> Response {
    let allocation_id = AllocationId::from_uuid(allocation_id);
    match services.allocation().allocation(ctx.tenant_id(), allocation_id) {
        Ok(allocation) => Json(allocation).into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn release(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(allocation_id): Path<Uuid>,
) -> Response {
    let allocation_id = AllocationId::from_uuid(allocation_id);
    match services.allocation().release(ctx.tenant_id(), allocation_id) {
        Ok(()) => state_response(&services, ctx.tenant_id(), allocation_id),
        Err(e) => dispatch_error_response(e),
    }
}

async fn pick(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(allocation_id): Path<Uuid>,
) -> Response {
    let allocation_id = AllocationId::from_uuid(allocation_id);
    match services.allocation().pick(ctx.tenant_id(), allocation_id) {
        Ok(()) => state_response(&services, ctx.tenant_id(), allocation_id),
        Err(e) => dispatch_error_response(e),
    }
}

async fn pack(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(allocation_id): Path<Uuid>,
) -> Response {
    let allocation_id = AllocationId::from_uuid(allocation_id);
    match services.allocation().pack(ctx.tenant_id(), allocation_id) {
        Ok(()) => state_response(&services, ctx.tenant_id(), allocation_id),
        Err(e) => dispatch_error_response(e),
    }
}

async fn commit_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(allocation_id): Path<Uuid>,
) -> Response {
    let allocation_id = AllocationId::from_uuid(allocation_id);
    match services
        .allocation()
        .commit_shipment(ctx.tenant_id(), allocation_id)
    {
        Ok(()) => state_response(&services, ctx.tenant_id(), allocation_id),
        Err(e) => dispatch_error_response(e),
    }
}
