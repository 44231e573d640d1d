pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{Extension, Router};

/// Build the full application router.
///
/// `/health` is public; everything else sits behind the tenant middleware and
/// shares one `AppServices` via an extension layer.
pub async fn build_app() -> Router {
    let services = Arc::new(services::build_services().await);
    build_app_with_services(services)
}

pub fn build_app_with_services(services: Arc<services::AppServices>) -> Router {
    let protected = Router::new()
        .merge(routes::lots::router())
        .merge(routes::allocations::router())
        .merge(routes::stock::router())
        .merge(routes::movements::router())
        .merge(routes::transfers::router())
        .merge(routes::advisor::router())
        .merge(routes::system::stream_router())
        .layer(axum::middleware::from_fn(crate::middleware::tenant_middleware))
        .layer(Extension(services));

    Router::new()
        .merge(routes::system::public_router())
        .merge(protected)
}
