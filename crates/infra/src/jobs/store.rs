//! Job storage: the queue the pipeline worker drains.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{InvoiceJob, JobId, JobKind, JobStatus};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }
}

/// Queue counters, logged by the worker on every sweep tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub exhausted: usize,
}

/// Job store abstraction.
///
/// `claim_next` is the only contended operation: it must hand each pending
/// job to exactly one caller, FIFO by creation time among jobs whose
/// `not_before` has passed.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(&self, job: InvoiceJob) -> Result<JobId, JobStoreError>;

    async fn get(&self, id: JobId) -> Result<Option<InvoiceJob>, JobStoreError>;

    /// Atomically claim the next ready job: marks it `Running` and bumps
    /// `attempt`. Returns `None` when nothing is ready.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<InvoiceJob>, JobStoreError>;

    async fn complete(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Put a failed job back in the queue, eligible at `not_before`.
    async fn reschedule(
        &self,
        id: JobId,
        not_before: DateTime<Utc>,
        error: String,
    ) -> Result<(), JobStoreError>;

    /// Retire a job that ran out of attempts.
    async fn exhaust(&self, id: JobId, error: String) -> Result<(), JobStoreError>;

    /// Whether any job of `kind` is pending or running. The sweep timer
    /// uses this to avoid stacking overlapping sweeps.
    async fn has_live(&self, kind: JobKind) -> Result<bool, JobStoreError>;

    async fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, InvoiceJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl InMemoryJobStore {
    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut InvoiceJob) -> T,
    ) -> Result<T, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(JobStoreError::storage)?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        let out = f(job);
        job.updated_at = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: InvoiceJob) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(JobStoreError::storage)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<InvoiceJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(JobStoreError::storage)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<InvoiceJob>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(JobStoreError::storage)?;
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.not_before <= now)
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next_id.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.status = JobStatus::Running;
                job.attempt += 1;
                job.updated_at = now;
                job.clone()
            })
        }))
    }

    async fn complete(&self, id: JobId) -> Result<(), JobStoreError> {
        self.with_job(id, |job| {
            job.status = JobStatus::Completed;
        })
    }

    async fn reschedule(
        &self,
        id: JobId,
        not_before: DateTime<Utc>,
        error: String,
    ) -> Result<(), JobStoreError> {
        self.with_job(id, |job| {
            job.status = JobStatus::Pending;
            job.not_before = not_before;
            job.last_error = Some(error);
        })
    }

    async fn exhaust(&self, id: JobId, error: String) -> Result<(), JobStoreError> {
        self.with_job(id, |job| {
            job.status = JobStatus::Exhausted;
            job.last_error = Some(error);
        })
    }

    async fn has_live(&self, kind: JobKind) -> Result<bool, JobStoreError> {
        let jobs = self.jobs.read().map_err(JobStoreError::storage)?;
        Ok(jobs
            .values()
            .any(|j| j.kind == kind && !j.status.is_terminal()))
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(JobStoreError::storage)?;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Exhausted => stats.exhausted += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendia_core::SaleId;

    #[tokio::test]
    async fn claims_are_fifo_and_exclusive() {
        let store = InMemoryJobStore::new();
        let first = InvoiceJob::create_voucher(SaleId::new());
        let second = InvoiceJob::create_voucher(SaleId::new());
        let first_id = first.id;
        let second_id = second.id;
        store.enqueue(first).await.unwrap();
        store.enqueue(second).await.unwrap();

        let now = Utc::now();
        let a = store.claim_next(now).await.unwrap().unwrap();
        let b = store.claim_next(now).await.unwrap().unwrap();
        assert_eq!(a.id, first_id);
        assert_eq!(b.id, second_id);
        assert_eq!(a.attempt, 1);
        assert!(store.claim_next(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rescheduled_jobs_wait_out_their_backoff() {
        let store = InMemoryJobStore::new();
        let job = InvoiceJob::create_voucher(SaleId::new());
        let id = store.enqueue(job).await.unwrap();

        let now = Utc::now();
        store.claim_next(now).await.unwrap().unwrap();
        let later = now + chrono::Duration::seconds(30);
        store
            .reschedule(id, later, "timeout".to_string())
            .await
            .unwrap();

        assert!(store.claim_next(now).await.unwrap().is_none());
        let reclaimed = store.claim_next(later).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.attempt, 2);
        assert_eq!(reclaimed.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn has_live_ignores_finished_jobs() {
        let store = InMemoryJobStore::new();
        let sweep = InvoiceJob::check_pending_vouchers();
        let id = store.enqueue(sweep).await.unwrap();
        assert!(store.has_live(JobKind::CheckPendingVouchers).await.unwrap());
        assert!(!store.has_live(JobKind::CreateVoucher).await.unwrap());

        store.claim_next(Utc::now()).await.unwrap().unwrap();
        assert!(store.has_live(JobKind::CheckPendingVouchers).await.unwrap());

        store.complete(id).await.unwrap();
        assert!(!store.has_live(JobKind::CheckPendingVouchers).await.unwrap());
    }
}
