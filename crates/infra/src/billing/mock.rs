//! Scriptable authority double for tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use vendia_billing::{
    AuthorityError, AuthorityStatus, InvoicePayload, SubmitAck, TaxAuthority, VoucherDocument,
};

/// In-process [`TaxAuthority`] with scriptable responses.
///
/// Unscripted calls take the happy path: `submit` acknowledges with
/// `PENDING` and a generated access key, `fetch_status` authorizes with a
/// voucher. Push responses to script failures, rejections or slow
/// authorizations; each pushed response is consumed once, in order.
#[derive(Debug, Default)]
pub struct MockAuthority {
    submit_script: Mutex<VecDeque<Result<SubmitAck, AuthorityError>>>,
    status_script: Mutex<VecDeque<Result<AuthorityStatus, AuthorityError>>>,
    submissions: Mutex<Vec<InvoicePayload>>,
    status_queries: Mutex<Vec<String>>,
    key_counter: AtomicU64,
}

impl MockAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, response: Result<SubmitAck, AuthorityError>) {
        self.submit_script.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, response: Result<AuthorityStatus, AuthorityError>) {
        self.status_script.lock().unwrap().push_back(response);
    }

    /// Every payload `submit` has received, in order.
    pub fn submissions(&self) -> Vec<InvoicePayload> {
        self.submissions.lock().unwrap().clone()
    }

    /// Every access key `fetch_status` has been asked about, in order.
    pub fn status_queries(&self) -> Vec<String> {
        self.status_queries.lock().unwrap().clone()
    }

    pub fn authorized_with_voucher(access_key: &str) -> AuthorityStatus {
        AuthorityStatus::Authorized {
            voucher: Some(VoucherDocument {
                comprobante_id: format!("comprobante-{access_key}"),
                document: format!("<factura clave=\"{access_key}\"/>"),
            }),
        }
    }

    fn next_key(&self) -> String {
        let n = self.key_counter.fetch_add(1, Ordering::Relaxed);
        format!("mock-access-key-{n:04}")
    }
}

#[async_trait]
impl TaxAuthority for MockAuthority {
    async fn submit(&self, payload: &InvoicePayload) -> Result<SubmitAck, AuthorityError> {
        self.submissions.lock().unwrap().push(payload.clone());
        if let Some(scripted) = self.submit_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(SubmitAck {
            access_key: self.next_key(),
            status: AuthorityStatus::Pending,
        })
    }

    async fn fetch_status(&self, access_key: &str) -> Result<AuthorityStatus, AuthorityError> {
        self.status_queries
            .lock()
            .unwrap()
            .push(access_key.to_string());
        if let Some(scripted) = self.status_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(Self::authorized_with_voucher(access_key))
    }
}
