//! Job types and the retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vendia_core::SaleId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the worker should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Build the fiscal payload for a sale and submit it to the authority.
    CreateVoucher,
    /// Poll the authority for a submitted sale's verdict and fetch the
    /// voucher document once authorized.
    CreateComprobante,
    /// Sweep sales stuck at `PROCESSING` and reconcile them.
    CheckPendingVouchers,
}

impl JobKind {
    /// Stable string form used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::CreateVoucher => "create_voucher",
            JobKind::CreateComprobante => "create_comprobante",
            JobKind::CheckPendingVouchers => "check_pending_vouchers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create_voucher" => Some(JobKind::CreateVoucher),
            "create_comprobante" => Some(JobKind::CreateComprobante),
            "check_pending_vouchers" => Some(JobKind::CheckPendingVouchers),
            _ => None,
        }
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued; eligible once `not_before` has passed.
    Pending,
    /// Claimed by a worker.
    Running,
    /// Done. The sale may or may not have reached a terminal state.
    Completed,
    /// Retries ran out; the job will never run again.
    Exhausted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Exhausted)
    }

    /// Stable string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "exhausted" => Some(JobStatus::Exhausted),
            _ => None,
        }
    }
}

/// One queued unit of invoice-pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceJob {
    pub id: JobId,
    pub kind: JobKind,
    /// Absent only for `CheckPendingVouchers`.
    pub sale_id: Option<SaleId>,
    pub status: JobStatus,
    /// Times this job has been claimed, including the current run.
    pub attempt: u32,
    /// Earliest claimable time; pushed forward by the retry backoff.
    pub not_before: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Override for the result webhook; falls back to the configured URL.
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceJob {
    pub fn new(kind: JobKind, sale_id: Option<SaleId>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            sale_id,
            status: JobStatus::Pending,
            attempt: 0,
            not_before: now,
            last_error: None,
            callback_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn create_voucher(sale_id: SaleId) -> Self {
        Self::new(JobKind::CreateVoucher, Some(sale_id))
    }

    pub fn create_comprobante(sale_id: SaleId) -> Self {
        Self::new(JobKind::CreateComprobante, Some(sale_id))
    }

    pub fn check_pending_vouchers() -> Self {
        Self::new(JobKind::CheckPendingVouchers, None)
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// Exponential backoff with a cap. Deliberately jitter-free: a single
/// worker pool polls a single authority, so thundering herds are not a
/// concern and deterministic delays keep tests honest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before the job is exhausted (includes the first run).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the next run, given the attempt that just failed
    /// (1-indexed): base, 2×base, 4×base, ... capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Whether a job that just failed its `attempt`-th run gets another.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn retry_budget_counts_the_first_run() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn kind_round_trips_through_storage_form() {
        for kind in [
            JobKind::CreateVoucher,
            JobKind::CreateComprobante,
            JobKind::CheckPendingVouchers,
        ] {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::parse("bogus"), None);
    }
}
