//! Reorder advisor routes (read-only; advice is never a domain event).

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/advisor/recommendations", get(recommendations))
        .route("/advisor/forecast", get(forecast))
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    warehouse: Option<String>,
}

async fn recommendations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<RecommendationQuery>,
) -> Response {
    match services.advisor_output(ctx.tenant_id()) {
        Ok(output) => {
            let mut recommendations = output.recommendations;
            if let Some(warehouse) = &query.warehouse {
                recommendations.retain(|r| r.warehouse.as_str() == warehouse);
            }
            Json(recommendations).into_response()
        }
        Err(e) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "advisor_failed",
            &e.to_string(),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    sku: Option<String>,
    warehouse: Option<String>,
    method: Option<lotline_forecast::ForecastMethod>,
    horizon: Option<u32>,
}

async fn forecast(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ForecastQuery>,
) -> Response {
    match services.forecasts(ctx.tenant_id(), query.horizon, query.method) {
        Ok(mut forecasts) => {
            if let Some(sku) = &query.sku {
                forecasts.retain(|f| f.sku.as_str() == sku);
            }
            if let Some(warehouse) = &query.warehouse {
                forecasts.retain(|f| f.warehouse.as_str() == warehouse);
            }
            Json(forecasts).into_response()
        }
        Err(e) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "advisor_failed",
            &e.to_string(),
        ),
    }
}
