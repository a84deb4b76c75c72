use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use vendia_core::DomainError;
use vendia_infra::store::StoreError;

/// Map a store failure to the wire contract.
///
/// Domain rejections are client errors with a stable `error` code; only a
/// backend fault becomes a 500.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        StoreError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", msg)
        }
        StoreError::Domain(err @ DomainError::InsufficientStock { .. }) => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        }
        StoreError::Domain(err @ DomainError::PaymentMismatch { .. }) => {
            json_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "payment_mismatch",
                err.to_string(),
            )
        }
        StoreError::Domain(DomainError::NotFound) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "not found")
        }
        StoreError::Domain(DomainError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        StoreError::Storage(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
