//! Lot intake and quality routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use lotline_infra::STOCK_POSITION_AGGREGATE_TYPE;
use lotline_stock::{
    AdjustLot, LotId, QualityStatus, ReceiveLot, RotationPolicy, StockCommand, StockPosition,
    StockPositionId, UpdateLotQuality, WriteOffLot,
};

use crate::app::dto::{
    AdjustLotRequest, InspectLotRequest, QuarantineLotRequest, ReceiveLotRequest,
    WriteOffLotRequest,
};
use crate::app::errors::{dispatch_error_response, json_error};
use crate::app::routes::parse_position;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/lots", post(receive_lot).get(list_lots))
        .route("/lots/:lot_id/inspect", post(inspect_lot))
        .route("/lots/:lot_id/quarantine", post(quarantine_lot))
        .route("/lots/:lot_id/adjust", post(adjust_lot))
        .route("/lots/:lot_id/write-off", post(write_off_lot))
}

async fn receive_lot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<ReceiveLotRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let lot_id = LotId::new();

    let command = StockCommand::ReceiveLot(ReceiveLot {
        tenant_id,
        sku,
        warehouse,
        lot_id,
        quantity: body.quantity,
        expiration: body.expiration,
        best_before: body.best_before,
        bin_location: body.bin_location,
        occurred_at: Utc::now(),
    });

    let committed = match dispatch_stock(&services, tenant_id, position_id, command) {
        Ok(events) => events,
        Err(resp) => return resp,
    };

    // The aggregate assigns the position-unique lot number.
    let lot_number = committed.iter().find_map(|stored| {
        match serde_json::from_value::<lotline_stock::StockEvent>(stored.payload.clone()) {
            Ok(lotline_stock::StockEvent::LotReceived(e)) if e.lot_id == lot_id => {
                Some(e.lot_number)
            }
            _ => None,
        }
    });

    (
        StatusCode::CREATED,
        Json(json!({ "lot_id": lot_id.as_uuid(), "lot_number": lot_number })),
    )
        .into_response()
}

async fn list_lots(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<LotsQuery>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&query.sku, &query.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let policy = query.policy.unwrap_or_default();

    match services.eligible_lots(tenant_id, &sku, &warehouse, policy) {
        Ok(lots) if lots.is_empty() && services.stock_get(tenant_id, &sku, &warehouse).is_none() => {
            json_error(StatusCode::NOT_FOUND, "unknown_sku", "no stock position")
        }
        Ok(lots) => Json(lots).into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

#[derive(Debug, serde::Deserialize)]
struct LotsQuery {
    sku: String,
    warehouse: String,
    policy: Option<RotationPolicy>,
}

async fn inspect_lot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(lot_id): Path<Uuid>,
    Json(body): Json<InspectLotRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let command = StockCommand::UpdateLotQuality(UpdateLotQuality {
        tenant_id,
        lot_id: LotId::from_uuid(lot_id),
        status: body.status,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    match dispatch_stock(&services, tenant_id, position_id, command) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

async fn quarantine_lot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(lot_id): Path<Uuid>,
    Json(body): Json<QuarantineLotRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let command = StockCommand::UpdateLotQuality(UpdateLotQuality {
        tenant_id,
        lot_id: LotId::from_uuid(lot_id),
        status: QualityStatus::Quarantined,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    match dispatch_stock(&services, tenant_id, position_id, command) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

async fn adjust_lot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(lot_id): Path<Uuid>,
    Json(body): Json<AdjustLotRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let command = StockCommand::AdjustLot(AdjustLot {
        tenant_id,
        lot_id: LotId::from_uuid(lot_id),
        delta: body.delta,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    match dispatch_stock(&services, tenant_id, position_id, command) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

async fn write_off_lot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Path(lot_id): Path<Uuid>,
    Json(body): Json<WriteOffLotRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let command = StockCommand::WriteOffLot(WriteOffLot {
        tenant_id,
        lot_id: LotId::from_uuid(lot_id),
        quantity: body.quantity,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    match dispatch_stock(&services, tenant_id, position_id, command) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

fn dispatch_stock(
    services: &AppServices,
    tenant_id: lotline_core::TenantId,
    position_id: StockPositionId,
    command: StockCommand,
) -> Result<Vec<lotline_infra::StoredEvent>, Response> {
    services
        .dispatch::<StockPosition>(
            tenant_id,
            position_id.0,
            STOCK_POSITION_AGGREGATE_TYPE,
            command,
            |_, _| StockPosition::empty(position_id),
        )
        .map_err(dispatch_error_response)
}
