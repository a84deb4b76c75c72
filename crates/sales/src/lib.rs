//! `vendia-sales` — the sale-commit domain.
//!
//! Turns a cart (items + payments + customer) into a priced, internally
//! consistent `Sale`, or rejects it outright. Persistence and atomicity
//! live in the store layer; everything here is pure.

pub mod cart;
pub mod sale;
pub mod status;

pub use cart::{Cart, CartItem, Payment, PaymentMethod};
pub use sale::{price_cart, PricedCart, Sale, SaleItem};
pub use status::SriStatus;
