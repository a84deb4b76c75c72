use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vendia_core::LedgerEntryId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_entries).post(record_movement))
        .route("/lasted", get(latest_entries))
        .route("/:id", get(get_entry))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::KardexParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(response) => return response,
    };

    match services.store.kardex(&query).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Record a manual stock movement (restock, adjustment, damage, ...).
/// Sales never come through here; they are written by the commit path.
pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let (product_id, movement) = body.into_movement();

    match services.store.record_movement(product_id, movement).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Most recent entries across all products, for operational visibility.
pub async fn latest_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::LatestParams>,
) -> axum::response::Response {
    match services.store.kardex_latest(params.limit.unwrap_or(20)).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: LedgerEntryId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid entry id")
        }
    };

    match services.store.get_entry(id).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(entry)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "entry not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
