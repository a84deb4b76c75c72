//! Result webhook: tells the POS front end how a sale's invoice ended up.

use serde::{Deserialize, Serialize};
use tracing::warn;

use vendia_core::SaleId;
use vendia_sales::{Sale, SriStatus};

/// Body POSTed to the webhook when a sale reaches a terminal invoice state
/// (or when a re-notification is requested).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNotification {
    pub sale_id: SaleId,
    pub estado_sri: SriStatus,
    pub clave_acceso: Option<String>,
    pub comprobante_id: Option<String>,
    pub sri_message: Option<String>,
}

impl InvoiceNotification {
    pub fn from_sale(sale: &Sale) -> Self {
        Self {
            sale_id: sale.id,
            estado_sri: sale.estado_sri,
            clave_acceso: sale.clave_acceso.clone(),
            comprobante_id: sale.comprobante_id.clone(),
            sri_message: sale.sri_message.clone(),
        }
    }
}

/// Fire-and-forget webhook sender.
///
/// Delivery failures are logged and dropped: the sale's state is already
/// durable, and the front end can always re-request via the resend
/// endpoint. A webhook outage must never wedge the pipeline.
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    default_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(default_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_url,
        }
    }

    /// POST the notification to `override_url`, falling back to the
    /// configured default. No-op when neither exists.
    pub async fn notify(&self, sale: &Sale, override_url: Option<&str>) {
        let Some(url) = override_url.or(self.default_url.as_deref()) else {
            return;
        };
        let body = InvoiceNotification::from_sale(sale);
        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(sale_id = %sale.id, status = %response.status(), "webhook rejected notification");
            }
            Err(err) => {
                warn!(sale_id = %sale.id, error = %err, "webhook delivery failed");
            }
        }
    }
}
