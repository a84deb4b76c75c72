//! Storage abstraction for products, sales and the stock ledger.
//!
//! Two implementations ship: [`InMemoryPosStore`] for tests and development,
//! and [`PostgresPosStore`] for production. Both funnel pricing through
//! `vendia_sales::price_cart` and entry construction through
//! `vendia_ledger::LedgerEntry::build`, so the commit semantics cannot drift
//! between backends; the store's own job is atomicity.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryPosStore;
pub use postgres::PostgresPosStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vendia_billing::{reconcile, AuthorityStatus, SubmitAck};
use vendia_core::{CustomerId, DomainError, LedgerEntryId, ProductId, SaleId};
use vendia_ledger::{LedgerEntry, MovementType, NewMovement, Product};
use vendia_sales::{Cart, Sale, SriStatus};

/// Storage-layer error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Deterministic business rejection (validation, stock, payments).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The backend itself failed (connection, serialization, constraint).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Whether this is a domain rejection rather than an infrastructure
    /// fault. Callers use this to pick 4xx vs 5xx.
    pub fn is_domain(&self) -> bool {
        matches!(self, StoreError::Domain(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::Domain(DomainError::NotFound),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

/// A state change to a sale's invoice fields, produced by the pipeline
/// worker or the sweeper.
///
/// Every variant is folded into the sale through [`apply_sri_update`], which
/// routes the status transition through `vendia_billing::reconcile`. That
/// keeps updates monotonic and idempotent no matter who delivers them or how
/// many times.
#[derive(Debug, Clone)]
pub enum SriUpdate {
    /// The authority acknowledged a submission.
    Submitted { ack: SubmitAck },
    /// A later status poll (worker retry or sweeper) observed a verdict.
    Observed { status: AuthorityStatus },
    /// Retries ran out before the authority accepted the submission.
    Exhausted { message: String },
}

/// Fold an update into a sale snapshot. Pure; shared by both store backends.
pub fn apply_sri_update_to(sale: &mut Sale, update: &SriUpdate) {
    match update {
        SriUpdate::Submitted { ack } => {
            if sale.clave_acceso.is_none() {
                sale.clave_acceso = Some(ack.access_key.clone());
            }
            fold_status(sale, &ack.status);
        }
        SriUpdate::Observed { status } => fold_status(sale, status),
        SriUpdate::Exhausted { message } => {
            if !sale.estado_sri.is_terminal() {
                sale.estado_sri = SriStatus::Error;
                sale.sri_message = Some(message.clone());
            }
        }
    }
}

fn fold_status(sale: &mut Sale, observed: &AuthorityStatus) {
    let next = reconcile(sale.estado_sri, observed);
    // The voucher document can trail the authorization: a synchronous ack
    // may carry `Authorized { voucher: None }` and the document only shows
    // up on a later poll. Record it whenever the folded state is (still)
    // AUTHORIZED, even when the status itself no longer changes.
    if let AuthorityStatus::Authorized { voucher: Some(v) } = observed {
        if next == SriStatus::Authorized {
            sale.comprobante_id = Some(v.comprobante_id.clone());
            sale.pdf_voucher = Some(v.document.clone());
        }
    }
    if next == sale.estado_sri && sale.estado_sri.is_terminal() {
        return;
    }
    if let AuthorityStatus::Rejected { message } = observed {
        sale.sri_message = Some(message.clone());
    }
    sale.estado_sri = next;
}

/// Filters for the kardex query endpoints.
#[derive(Debug, Clone, Default)]
pub struct KardexQuery {
    pub product_id: Option<ProductId>,
    pub movement: Option<MovementType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

/// Filters for sale listing.
#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub customer_id: Option<CustomerId>,
    pub estado_sri: Option<SriStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Clamp to sane bounds; callers pass user input straight through.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 500),
            offset: self.offset.max(0),
        }
    }
}

/// The persistence seam for the whole POS back end.
///
/// `commit_sale` and `record_movement` are the only write paths that touch
/// stock, and both are atomic: the sale (or manual movement), its ledger
/// entries and the stock column change land together or not at all.
#[async_trait]
pub trait PosStore: Send + Sync {
    /// Insert or replace a product in the catalog.
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Validate, price and commit a cart atomically.
    ///
    /// On success the sale exists, one `sale` ledger entry per line exists,
    /// and every touched product's stock is decremented. Any rejection
    /// (validation, `InsufficientStock`, `PaymentMismatch`) leaves no trace.
    async fn commit_sale(&self, cart: &Cart) -> Result<Sale, StoreError>;

    /// Record one manual stock movement (purchase, adjustment, damage, ...)
    /// atomically with the product's stock update.
    async fn record_movement(
        &self,
        product_id: ProductId,
        movement: NewMovement,
    ) -> Result<LedgerEntry, StoreError>;

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;

    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<Sale>, StoreError>;

    /// Sales stuck at `PROCESSING` whose last update is older than `cutoff`.
    /// This is the sweeper's work queue.
    async fn sales_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Sale>, StoreError>;

    /// Apply an invoice-pipeline update to a sale and return the new
    /// snapshot. Monotonic: terminal states are never demoted.
    async fn apply_sri_update(
        &self,
        sale_id: SaleId,
        update: SriUpdate,
    ) -> Result<Sale, StoreError>;

    /// Ledger entries in chronological order (the audit view).
    async fn kardex(&self, query: &KardexQuery) -> Result<Vec<LedgerEntry>, StoreError>;

    /// The most recent entries across all products (the "lasted" view, for
    /// operational visibility).
    async fn kardex_latest(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Product snapshots for a cart, used by callers that price without
    /// committing.
    async fn products_for(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, StoreError>;
}
