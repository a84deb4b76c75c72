use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};

use vendia_infra::jobs::InvoiceJob;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/resend-webhook", post(resend_webhook))
}

/// Re-deliver a sale's invoice result to the webhook.
///
/// Submitted sales get a `create_comprobante` job (which re-polls and
/// notifies); never-submitted ones get a fresh `create_voucher` job. Either
/// way the work is queued, not done inline: 202.
pub async fn resend_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ResendWebhookRequest>,
) -> axum::response::Response {
    let sale = match services.store.get_sale(body.sale_id).await {
        Ok(Some(sale)) => sale,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found")
        }
        Err(e) => return errors::store_error_to_response(e),
    };

    let mut job = if sale.clave_acceso.is_some() {
        InvoiceJob::create_comprobante(sale.id)
    } else {
        InvoiceJob::create_voucher(sale.id)
    };
    job.callback_url = body.callback_url;
    let kind = job.kind;

    match services.jobs.enqueue(job).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "job_id": job_id,
                "kind": kind.as_str(),
            })),
        )
            .into_response(),
        Err(err) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "queue_error",
            err.to_string(),
        ),
    }
}
