//! Stock read-model and policy routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use lotline_infra::STOCK_POSITION_AGGREGATE_TYPE;
use lotline_stock::{
    ReorderPolicy, SetReorderPolicy, StockCommand, StockPosition, StockPositionId,
};

use crate::app::dto::{ReconcileRequest, SetReorderPolicyRequest};
use crate::app::errors::dispatch_error_response;
use crate::app::routes::parse_position;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/stock", get(list_stock))
        .route("/stock/reconcile", post(reconcile))
        .route("/stock/reorder-policy", post(set_reorder_policy))
}

async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    axum::extract::Query(query): axum::extract::Query<StockQuery>,
) -> Response {
    let tenant_id = ctx.tenant_id();

    // With both coordinates, answer for the single position.
    if let (Some(sku), Some(warehouse)) = (&query.sku, &query.warehouse) {
        let (sku, warehouse) = match parse_position(sku, warehouse) {
            Ok(ids) => ids,
            Err(resp) => return resp,
        };
        return match services.stock_get(tenant_id, &sku, &warehouse) {
            Some(summary) => Json(summary).into_response(),
            None => crate::app::errors::json_error(
                StatusCode::NOT_FOUND,
                "unknown_sku",
                "no stock position",
            ),
        };
    }

    let mut summaries = services.stock_list(tenant_id);
    if let Some(warehouse) = &query.warehouse {
        summaries.retain(|s| s.warehouse.as_str() == warehouse);
    }
    if let Some(sku) = &query.sku {
        summaries.retain(|s| s.sku.as_str() == sku);
    }
    Json(summaries).into_response()
}

#[derive(Debug, serde::Deserialize)]
struct StockQuery {
    sku: Option<String>,
    warehouse: Option<String>,
}

async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<ReconcileRequest>,
) -> Response {
    let position = match (&body.sku, &body.warehouse) {
        (Some(sku), Some(warehouse)) => match parse_position(sku, warehouse) {
            Ok(ids) => Some(ids),
            Err(resp) => return resp,
        },
        (None, None) => None,
        _ => {
            return crate::app::errors::bad_request("sku and warehouse must be given together");
        }
    };

    let scope = position.as_ref().map(|(sku, warehouse)| (sku, warehouse));
    match services.reconcile(ctx.tenant_id(), scope, body.repair) {
        Ok(report) => Json(json!({
            "positions_checked": report.positions_checked,
            "clean": report.is_clean(),
            "drifted": report.drifted,
        }))
        .into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn set_reorder_policy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<SetReorderPolicyRequest>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&body.sku, &body.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    let position_id = StockPositionId::derive(tenant_id, &sku, &warehouse);
    let command = StockCommand::SetReorderPolicy(SetReorderPolicy {
        tenant_id,
        sku,
        warehouse,
        policy: ReorderPolicy {
            reorder_point: body.reorder_point,
            reorder_quantity: body.reorder_quantity,
            lead_time_days: body.lead_time_days,
            low_stock_threshold: body.low_stock_threshold,
            rotation_policy: body.rotation_policy,
        },
        occurred_at: Utc::now(),
    });

    let result = services.dispatch::<StockPosition>(
        tenant_id,
        position_id.0,
        STOCK_POSITION_AGGREGATE_TYPE,
        command,
        |_, _| StockPosition::empty(position_id),
    );

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => dispatch_error_response(e),
    }
}
