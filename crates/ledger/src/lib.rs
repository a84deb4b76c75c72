//! `vendia-ledger` — the stock ledger (kardex) domain.
//!
//! The ledger is an append-only log of signed stock movements per product;
//! it is the single source of truth for how much stock exists and why.
//! A product's stock column is a cached projection of this log and is only
//! ever updated in the same transaction as the entry that justifies it.

pub mod entry;
pub mod movement;
pub mod product;

pub use entry::{LedgerEntry, NewMovement};
pub use movement::{MovementType, StockDirection};
pub use product::Product;
