//! The invoice job queue.
//!
//! Sale commits and the sweep timer enqueue jobs; the pipeline worker drains
//! them. The queue is at-least-once: a handler may see the same job twice
//! after a crash, so every handler is idempotent against the sale's current
//! invoice state.

mod postgres;
mod store;
mod types;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{InvoiceJob, JobId, JobKind, JobStatus, RetryPolicy};
