//! Warehouse transfer routes.
//!
//! A POST opens, approves and executes the transfer in one pass. If a leg
//! fails the transfer is marked stuck and a later POST to `/transfers/:id/receive`
//! picks up where it left off (the legs are idempotent).

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

use lotline_core::AggregateId;
use lotline_stock::TransferId;

use crate::app::dto::RequestTransferRequest;
use crate::app::errors::{dispatch_error_response, json_error};
use crate::app::routes::parse_position;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/transfers", post(create_transfer).get(list_transfers))
        .route("/transfers/:transfer_id", get(get_transfer))
        .route("/transfers/:transfer_id/receive", post(resume_transfer))
}

async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<RequestTransferRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, from_warehouse) = match parse_position(&body.sku, &body.from_warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let to_warehouse = match lotline_core::WarehouseId::new(&body.to_warehouse) {
        Ok(w) => w,
        Err(e) => return crate::app::errors::bad_request(&e.to_string()),
    };

    let transfers = services.transfers();
    let transfer_id =
        match transfers.request(tenant_id, sku, from_warehouse, to_warehouse, body.quantity) {
            Ok(id) => id,
            Err(e) => return dispatch_error_response(e),
        };
    if let Err(e) = transfers.approve(tenant_id, transfer_id) {
        return dispatch_error_response(e);
    }

    // Execute both physical legs. A failed leg leaves the transfer stuck and
    // resumable; report the ID either way so the client can follow up.
    let execution = transfers.execute(tenant_id, transfer_id);
    let status = match &execution {
        Ok(()) => "received",
        Err(_) => "stuck",
    };

    let body = json!({ "transfer_id": transfer_id.0.as_uuid(), "status": status });
    match execution {
        Ok(()) => (StatusCode::CREATED, Json(body)).into_response(),
        Err(e) => {
            tracing::warn!(%transfer_id, "transfer execution failed: {e:?}");
            (StatusCode::CREATED, Json(body)).into_response()
        }
    }
}

async fn resume_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(transfer_id): Path<Uuid>,
) -> Response {
    let transfer_id = TransferId::new(AggregateId::from_uuid(transfer_id));
    match services.transfers().execute(ctx.tenant_id(), transfer_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(transfer_id): Path<Uuid>,
) -> Response {
    let transfer_id = TransferId::new(AggregateId::from_uuid(transfer_id));
    match services.transfers_get(ctx.tenant_id(), &transfer_id) {
        Some(model) => Json(model).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", "unknown transfer"),
    }
}

async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
) -> Response {
    Json(services.transfers_list(ctx.tenant_id())).into_response()
}
