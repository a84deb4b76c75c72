use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use vendia_core::SaleId;
use vendia_infra::jobs::InvoiceJob;
use vendia_sales::{Cart, SriStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale))
}

/// The sale-commit endpoint. Validates and prices the cart, commits it
/// atomically with its ledger entries and stock updates, then queues the
/// voucher job for electronic sales.
pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Json(cart): Json<Cart>,
) -> axum::response::Response {
    let sale = match services.store.commit_sale(&cart).await {
        Ok(sale) => sale,
        Err(e) => return errors::store_error_to_response(e),
    };

    if sale.estado_sri == SriStatus::Processing {
        // Post-commit: the sale stands even if the enqueue fails; the
        // sweeper re-queues submissions for stuck sales.
        if let Err(err) = services
            .jobs
            .enqueue(InvoiceJob::create_voucher(sale.id))
            .await
        {
            tracing::error!(sale_id = %sale.id, error = %err, "could not queue voucher job");
        }
    }

    (StatusCode::CREATED, Json(sale)).into_response()
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::SalesParams>,
) -> axum::response::Response {
    let filter = match params.into_filter() {
        Ok(filter) => filter,
        Err(response) => return response,
    };

    match services.store.list_sales(&filter).await {
        Ok(sales) => (StatusCode::OK, Json(sales)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: SaleId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid sale id")
        }
    };

    match services.store.get_sale(id).await {
        Ok(Some(sale)) => (StatusCode::OK, Json(sale)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
