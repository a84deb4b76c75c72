//! Infrastructure layer: storage, the invoice job queue, workers, and the
//! tax-authority client.

pub mod billing;
pub mod jobs;
pub mod store;
