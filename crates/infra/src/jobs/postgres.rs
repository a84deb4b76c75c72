//! Postgres-backed job store.
//!
//! `claim_next` uses `FOR UPDATE SKIP LOCKED` so multiple worker tasks (or
//! processes) can drain the same queue without handing a job out twice.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use vendia_core::SaleId;

use super::store::{JobStats, JobStore, JobStoreError};
use super::types::{InvoiceJob, JobId, JobKind, JobStatus};

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl From<sqlx::Error> for JobStoreError {
    fn from(err: sqlx::Error) -> Self {
        JobStoreError::Storage(err.to_string())
    }
}

const JOB_COLUMNS: &str =
    "id, kind, sale_id, status, attempt, not_before, last_error, callback_url, created_at, updated_at";

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(&self, job: InvoiceJob) -> Result<JobId, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO invoice_jobs (id, kind, sale_id, status, attempt, not_before,
                last_error, callback_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id.0)
        .bind(job.kind.as_str())
        .bind(job.sale_id.map(Uuid::from))
        .bind(job.status.as_str())
        .bind(job.attempt as i32)
        .bind(job.not_before)
        .bind(job.last_error.as_deref())
        .bind(job.callback_url.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                JobStoreError::AlreadyExists(job.id)
            }
            _ => JobStoreError::from(e),
        })?;
        Ok(job.id)
    }

    async fn get(&self, id: JobId) -> Result<Option<InvoiceJob>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM invoice_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<InvoiceJob>, JobStoreError> {
        let sql = format!(
            r#"
            UPDATE invoice_jobs
            SET status = 'running', attempt = attempt + 1, updated_at = $1
            WHERE id = (
                SELECT id FROM invoice_jobs
                WHERE status = 'pending' AND not_before <= $1
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn complete(&self, id: JobId) -> Result<(), JobStoreError> {
        self.set_status(id, "UPDATE invoice_jobs SET status = 'completed', updated_at = now() WHERE id = $1")
            .await
    }

    async fn reschedule(
        &self,
        id: JobId,
        not_before: DateTime<Utc>,
        error: String,
    ) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            "UPDATE invoice_jobs SET status = 'pending', not_before = $2, last_error = $3, \
             updated_at = now() WHERE id = $1",
        )
        .bind(id.0)
        .bind(not_before)
        .bind(&error)
        .execute(&*self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn exhaust(&self, id: JobId, error: String) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            "UPDATE invoice_jobs SET status = 'exhausted', last_error = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(&error)
        .execute(&*self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn has_live(&self, kind: JobKind) -> Result<bool, JobStoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM invoice_jobs WHERE kind = $1 \
             AND status IN ('pending', 'running')) AS live",
        )
        .bind(kind.as_str())
        .fetch_one(&*self.pool)
        .await?;
        Ok(row.try_get("live")?)
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM invoice_jobs GROUP BY status")
            .fetch_all(&*self.pool)
            .await?;
        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = n as usize,
                Some(JobStatus::Running) => stats.running = n as usize,
                Some(JobStatus::Completed) => stats.completed = n as usize,
                Some(JobStatus::Exhausted) => stats.exhausted = n as usize,
                None => {
                    return Err(JobStoreError::Storage(format!(
                        "unknown job status '{status}'"
                    )))
                }
            }
        }
        Ok(stats)
    }
}

impl PostgresJobStore {
    async fn set_status(&self, id: JobId, sql: &str) -> Result<(), JobStoreError> {
        let result = sqlx::query(sql).bind(id.0).execute(&*self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }
}

fn job_from_row(row: &PgRow) -> Result<InvoiceJob, JobStoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let attempt: i32 = row.try_get("attempt")?;
    let sale_id: Option<Uuid> = row.try_get("sale_id")?;

    Ok(InvoiceJob {
        id: JobId::from_uuid(row.try_get("id")?),
        kind: JobKind::parse(&kind)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown job kind '{kind}'")))?,
        sale_id: sale_id.map(SaleId::from_uuid),
        status: JobStatus::parse(&status)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown job status '{status}'")))?,
        attempt: attempt.max(0) as u32,
        not_before: row.try_get("not_before")?,
        last_error: row.try_get("last_error")?,
        callback_url: row.try_get("callback_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
