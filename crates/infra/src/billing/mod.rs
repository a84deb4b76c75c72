//! The invoice pipeline: HTTP client for the tax authority, the queue-driven
//! worker, the reconciliation sweeper, and the result webhook.

mod http_authority;
mod mock;
mod sweeper;
mod webhook;
mod worker;

pub use http_authority::HttpTaxAuthority;
pub use mock::MockAuthority;
pub use sweeper::{spawn_sweep_timer, sweep_once, SweepOutcome};
pub use webhook::{InvoiceNotification, WebhookNotifier};
pub use worker::InvoiceWorker;
