use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use lotline_core::TenantId;

use crate::context::TenantContext;

/// Header carrying the tenant for every domain route.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Require and parse the `X-Tenant-Id` header.
///
/// Every domain route is tenant-scoped; a request without a valid tenant ID
/// never reaches a handler.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));

    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;

    header
        .trim()
        .parse::<TenantId>()
        .map_err(|_| StatusCode::BAD_REQUEST)
}
