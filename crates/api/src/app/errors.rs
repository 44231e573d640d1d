use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde_json::json;

use lotline_infra::command_dispatcher::DispatchError;

/// Map a dispatch error onto an HTTP response.
///
/// Deterministic domain failures get 4xx codes; infrastructure failures get
/// 5xx. Concurrency conflicts are 409 so clients know a retry may succeed.
pub fn dispatch_error_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => {
            json_error(StatusCode::CONFLICT, "concurrency_conflict", &msg)
        }
        DispatchError::LockTimeout(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", &msg)
        }
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", &msg)
        }
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation", &msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", &msg)
        }
        DispatchError::InsufficientStock {
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "insufficient_stock",
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        DispatchError::UnknownLot(msg) => json_error(StatusCode::NOT_FOUND, "unknown_lot", &msg),
        DispatchError::UnknownSku(msg) => json_error(StatusCode::NOT_FOUND, "unknown_sku", &msg),
        DispatchError::InvalidQuantity(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_quantity", &msg)
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            tracing::error!("event deserialization failed: {msg}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal error",
            )
        }
        DispatchError::Store(e) => {
            tracing::error!("event store failure: {e:?}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal error",
            )
        }
        DispatchError::Publish(msg) => {
            // Events are durable; only fan-out failed.
            tracing::error!("event publication failed: {msg}");
            json_error(StatusCode::BAD_GATEWAY, "publish_failed", &msg)
        }
    }
}

pub fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": code, "message": message })),
    )
        .into_response()
}

pub fn bad_request(message: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation", message)
}
