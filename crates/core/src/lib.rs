//! `vendia-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, LedgerEntryId, ProductId, SaleId, UserId};
pub use money::{BasisPoints, Cents};
