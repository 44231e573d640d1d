//! Movement history (audit trail) routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::app::dto::PositionQuery;
use crate::app::errors::json_error;
use crate::app::routes::parse_position;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/movements", get(list_movements))
}

async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<PositionQuery>,
) -> Response {
    let tenant_id = ctx.tenant_id();
    let (sku, warehouse) = match parse_position(&query.sku, &query.warehouse) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };

    match services.movements_get(tenant_id, &sku, &warehouse) {
        Some(log) => Json(log.entries).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "unknown_sku", "no stock position"),
    }
}
