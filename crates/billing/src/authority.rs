use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::InvoicePayload;

/// Failure talking to the authority. Always retriable: rejections are not
/// errors, they arrive as an [`AuthorityStatus`] verdict.
#[derive(Debug, Error, Clone)]
pub enum AuthorityError {
    /// Network failure or timeout; the submission may or may not have landed.
    #[error("transient authority failure: {0}")]
    Transient(String),

    /// The authority answered with something we could not interpret.
    #[error("malformed authority response: {0}")]
    Protocol(String),
}

/// The authority's current verdict on a submitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status")]
pub enum AuthorityStatus {
    /// Accepted for deferred processing; poll again later.
    Pending,
    /// Authorized; the voucher document may arrive with the status or via a
    /// later fetch.
    Authorized {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voucher: Option<VoucherDocument>,
    },
    /// Rejected outright. The message is kept as the sale's diagnostic.
    Rejected { message: String },
}

/// The authority-issued electronic document evidencing a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherDocument {
    pub comprobante_id: String,
    /// Serialized voucher (the printable/archivable representation).
    pub document: String,
}

/// Acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Unique key the authority issues for the submitted invoice; used for
    /// all later status queries.
    pub access_key: String,
    pub status: AuthorityStatus,
}

/// The external tax authority, abstracted.
///
/// Implementations must bound their own I/O with a timeout; a timeout is
/// reported as [`AuthorityError::Transient`], never swallowed.
#[async_trait]
pub trait TaxAuthority: Send + Sync {
    async fn submit(&self, payload: &InvoicePayload) -> Result<SubmitAck, AuthorityError>;

    async fn fetch_status(&self, access_key: &str) -> Result<AuthorityStatus, AuthorityError>;
}
