//! HTTP client for the external tax authority.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use vendia_billing::{AuthorityError, AuthorityStatus, InvoicePayload, SubmitAck, TaxAuthority};

/// [`TaxAuthority`] over HTTP.
///
/// Submissions go to `POST {base}/comprobantes`, status polls to
/// `GET {base}/comprobantes/{access_key}`. Every request carries the
/// configured timeout; a timeout surfaces as `Transient` so the job layer
/// retries it.
#[derive(Debug, Clone)]
pub struct HttpTaxAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaxAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TaxAuthority for HttpTaxAuthority {
    #[instrument(skip(self, payload), fields(sale_id = %payload.sale_id))]
    async fn submit(&self, payload: &InvoicePayload) -> Result<SubmitAck, AuthorityError> {
        let url = format!("{}/comprobantes", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(classify)?;

        check_status(&response)?;
        response
            .json::<SubmitAck>()
            .await
            .map_err(|e| AuthorityError::Protocol(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn fetch_status(&self, access_key: &str) -> Result<AuthorityStatus, AuthorityError> {
        let url = format!("{}/comprobantes/{}", self.base_url, access_key);
        let response = self.client.get(&url).send().await.map_err(classify)?;

        check_status(&response)?;
        response
            .json::<AuthorityStatus>()
            .await
            .map_err(|e| AuthorityError::Protocol(e.to_string()))
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), AuthorityError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(AuthorityError::Transient(format!(
            "authority returned {status}"
        )));
    }
    if !status.is_success() {
        return Err(AuthorityError::Protocol(format!(
            "authority returned {status}"
        )));
    }
    Ok(())
}

fn classify(err: reqwest::Error) -> AuthorityError {
    if err.is_decode() {
        AuthorityError::Protocol(err.to_string())
    } else {
        // Timeouts, connection refusals, DNS failures: all retriable.
        AuthorityError::Transient(err.to_string())
    }
}
