#[tokio::main]
async fn main() {
    lotline_observability::init();

    let app = lotline_api::app::build_app().await;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("listening on {addr}");
    }

    axum::serve(listener, app).await.expect("server failed");
}
