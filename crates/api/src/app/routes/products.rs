use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vendia_core::ProductId;
use vendia_ledger::Product;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(upsert_product))
        .route("/:id", get(get_product))
}

pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    if body.stock < 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "stock cannot be negative",
        );
    }
    if body.unit_price < 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "unit_price cannot be negative",
        );
    }

    let product = Product::new(
        body.id.unwrap_or_default(),
        body.stock,
        body.unit_price,
        body.tax_rate_bp,
    );
    match services.store.upsert_product(product.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
        }
    };

    match services.store.get_product(id).await {
        Ok(Some(product)) => (StatusCode::OK, Json(product)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
