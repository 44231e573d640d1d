//! Health and realtime stream routes.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use crate::app::services::{AppServices, tenant_sse_stream};
use crate::context::TenantContext;

/// Routes that bypass tenant resolution.
pub fn public_router() -> Router {
    Router::new().route("/health", get(health))
}

/// Tenant-scoped realtime stream.
pub fn stream_router() -> Router {
    Router::new().route("/stream", get(stream))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TenantContext>,
) -> impl IntoResponse {
    tenant_sse_stream(services, ctx.tenant_id())
}
