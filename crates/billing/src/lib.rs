//! `vendia-billing` — the e-invoicing domain.
//!
//! Everything needed to obtain authorization for a committed sale from the
//! external tax authority: the authority contract, the fiscal payload built
//! from a sale snapshot, and the pure state-transition function shared by
//! the pipeline worker and the reconciliation sweeper.

pub mod authority;
pub mod payload;
pub mod reconcile;

pub use authority::{AuthorityError, AuthorityStatus, SubmitAck, TaxAuthority, VoucherDocument};
pub use payload::{Establishment, InvoicePayload};
pub use reconcile::reconcile;
