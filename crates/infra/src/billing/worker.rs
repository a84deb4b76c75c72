//! The queue-driven invoice pipeline worker.
//!
//! Claims jobs, talks to the authority, folds the answers into the sale and
//! notifies the webhook on terminal outcomes. Every handler is idempotent
//! against the sale's current state, because the queue is at-least-once and
//! the sweeper may race it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use vendia_billing::{AuthorityError, Establishment, InvoicePayload, TaxAuthority};
use vendia_core::SaleId;
use vendia_sales::{Sale, SriStatus};

use crate::jobs::{InvoiceJob, JobKind, JobStore, RetryPolicy};
use crate::store::{PosStore, SriUpdate};

use super::sweeper::sweep_once;
use super::webhook::WebhookNotifier;

/// How a job run ended, before retry accounting.
enum RunOutcome {
    Done,
    /// Transient failure; retry with backoff if the budget allows.
    Retry(String),
    /// Nothing sensible to retry (sale gone, no access key). Logged and
    /// completed so it never clogs the queue.
    Skip(String),
}

/// The invoice pipeline worker.
pub struct InvoiceWorker {
    store: Arc<dyn PosStore>,
    jobs: Arc<dyn JobStore>,
    authority: Arc<dyn TaxAuthority>,
    establishment: Establishment,
    retry: RetryPolicy,
    webhook: WebhookNotifier,
    sweep_threshold: Duration,
}

impl InvoiceWorker {
    pub fn new(
        store: Arc<dyn PosStore>,
        jobs: Arc<dyn JobStore>,
        authority: Arc<dyn TaxAuthority>,
        establishment: Establishment,
    ) -> Self {
        Self {
            store,
            jobs,
            authority,
            establishment,
            retry: RetryPolicy::default(),
            webhook: WebhookNotifier::default(),
            sweep_threshold: Duration::from_secs(300),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookNotifier) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn with_sweep_threshold(mut self, threshold: Duration) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Poll-and-drain loop. Runs until the task is aborted.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let ran = self.drain().await;
                if ran > 0 {
                    if let Ok(stats) = self.jobs.stats().await {
                        debug!(
                            pending = stats.pending,
                            running = stats.running,
                            completed = stats.completed,
                            exhausted = stats.exhausted,
                            "queue state"
                        );
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        })
    }

    /// Claim and run jobs until the queue has nothing ready. Returns how
    /// many jobs ran.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let claimed = match self.jobs.claim_next(Utc::now()).await {
                Ok(next) => next,
                Err(err) => {
                    error!(error = %err, "claiming next job failed");
                    return ran;
                }
            };
            let Some(job) = claimed else {
                return ran;
            };
            self.run_job(job).await;
            ran += 1;
        }
    }

    /// Execute one claimed job and settle its queue state.
    pub async fn run_job(&self, job: InvoiceJob) {
        debug!(job_id = %job.id, kind = job.kind.as_str(), attempt = job.attempt, "running job");

        let outcome = match job.kind {
            JobKind::CreateVoucher => self.create_voucher(&job).await,
            JobKind::CreateComprobante => self.create_comprobante(&job).await,
            JobKind::CheckPendingVouchers => self.check_pending_vouchers().await,
        };

        let result = match outcome {
            RunOutcome::Done => self.jobs.complete(job.id).await,
            RunOutcome::Skip(reason) => {
                warn!(job_id = %job.id, reason = %reason, "job skipped");
                self.jobs.complete(job.id).await
            }
            RunOutcome::Retry(message) => {
                if self.retry.allows_retry(job.attempt) {
                    let delay = self.retry.delay_for_attempt(job.attempt);
                    let not_before = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    info!(
                        job_id = %job.id,
                        attempt = job.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "job failed, retrying"
                    );
                    self.jobs.reschedule(job.id, not_before, message).await
                } else {
                    self.on_exhausted(&job, &message).await;
                    self.jobs.exhaust(job.id, message).await
                }
            }
        };

        if let Err(err) = result {
            error!(job_id = %job.id, error = %err, "could not settle job state");
        }
    }

    /// Last failed attempt. A sale whose submission never got through moves
    /// to `ERROR` so the terminal stops waiting; a submitted sale stays at
    /// `PROCESSING` and the sweeper owns it from here.
    async fn on_exhausted(&self, job: &InvoiceJob, message: &str) {
        warn!(job_id = %job.id, kind = job.kind.as_str(), "job exhausted its retries");
        if job.kind != JobKind::CreateVoucher {
            return;
        }
        let Some(sale_id) = job.sale_id else { return };

        match self
            .store
            .apply_sri_update(
                sale_id,
                SriUpdate::Exhausted {
                    message: format!("submission retries exhausted: {message}"),
                },
            )
            .await
        {
            Ok(sale) => {
                self.webhook.notify(&sale, job.callback_url.as_deref()).await;
            }
            Err(err) => {
                error!(sale_id = %sale_id, error = %err, "could not mark sale as errored");
            }
        }
    }

    async fn create_voucher(&self, job: &InvoiceJob) -> RunOutcome {
        let Some(sale_id) = job.sale_id else {
            return RunOutcome::Skip("create_voucher job without a sale".to_string());
        };
        let sale = match self.load_sale(sale_id).await {
            Ok(sale) => sale,
            Err(outcome) => return outcome,
        };

        if sale.estado_sri.is_terminal() {
            // Redelivery after the verdict already landed.
            return RunOutcome::Done;
        }
        if sale.clave_acceso.is_some() {
            // Submitted on an earlier attempt; hand over to the poll job.
            return self.queue_comprobante(sale_id, job.callback_url.clone()).await;
        }

        let payload = InvoicePayload::from_sale(&sale, &self.establishment);
        let ack = match self.authority.submit(&payload).await {
            Ok(ack) => ack,
            Err(err) => return retry_from(err),
        };

        let updated = match self
            .store
            .apply_sri_update(sale_id, SriUpdate::Submitted { ack })
            .await
        {
            Ok(updated) => updated,
            Err(err) => return RunOutcome::Retry(format!("persisting submission ack: {err}")),
        };

        match updated.estado_sri {
            SriStatus::Authorized if updated.pdf_voucher.is_some() => {
                self.webhook.notify(&updated, job.callback_url.as_deref()).await;
                RunOutcome::Done
            }
            SriStatus::Authorized | SriStatus::Processing => {
                // Verdict or voucher document still outstanding.
                self.queue_comprobante(sale_id, job.callback_url.clone()).await
            }
            SriStatus::Error => {
                self.webhook.notify(&updated, job.callback_url.as_deref()).await;
                RunOutcome::Done
            }
            SriStatus::NoElectronic => RunOutcome::Done,
        }
    }

    async fn create_comprobante(&self, job: &InvoiceJob) -> RunOutcome {
        let Some(sale_id) = job.sale_id else {
            return RunOutcome::Skip("create_comprobante job without a sale".to_string());
        };
        let sale = match self.load_sale(sale_id).await {
            Ok(sale) => sale,
            Err(outcome) => return outcome,
        };

        let voucher_outstanding =
            sale.estado_sri == SriStatus::Authorized && sale.pdf_voucher.is_none();
        if sale.estado_sri.is_terminal() && !voucher_outstanding {
            self.webhook.notify(&sale, job.callback_url.as_deref()).await;
            return RunOutcome::Done;
        }

        let Some(access_key) = sale.clave_acceso.clone() else {
            return RunOutcome::Skip(format!("sale {sale_id} has no access key to poll"));
        };

        let status = match self.authority.fetch_status(&access_key).await {
            Ok(status) => status,
            Err(err) => return retry_from(err),
        };

        let updated = match self
            .store
            .apply_sri_update(sale_id, SriUpdate::Observed { status })
            .await
        {
            Ok(updated) => updated,
            Err(err) => return RunOutcome::Retry(format!("persisting authority verdict: {err}")),
        };

        match updated.estado_sri {
            SriStatus::Authorized | SriStatus::Error => {
                self.webhook.notify(&updated, job.callback_url.as_deref()).await;
                RunOutcome::Done
            }
            // Still pending at the authority. Retry with backoff; if the
            // budget runs out the sale stays PROCESSING for the sweeper.
            SriStatus::Processing => RunOutcome::Retry("authority still pending".to_string()),
            SriStatus::NoElectronic => RunOutcome::Done,
        }
    }

    async fn check_pending_vouchers(&self) -> RunOutcome {
        match sweep_once(
            self.store.as_ref(),
            self.jobs.as_ref(),
            self.authority.as_ref(),
            self.sweep_threshold,
        )
        .await
        {
            Ok(_) => RunOutcome::Done,
            Err(err) => RunOutcome::Retry(format!("sweep failed: {err}")),
        }
    }

    async fn load_sale(&self, sale_id: SaleId) -> Result<Sale, RunOutcome> {
        match self.store.get_sale(sale_id).await {
            Ok(Some(sale)) => Ok(sale),
            Ok(None) => Err(RunOutcome::Skip(format!("sale {sale_id} does not exist"))),
            Err(err) => Err(RunOutcome::Retry(format!("loading sale {sale_id}: {err}"))),
        }
    }

    async fn queue_comprobante(
        &self,
        sale_id: SaleId,
        callback_url: Option<String>,
    ) -> RunOutcome {
        let mut job = InvoiceJob::create_comprobante(sale_id);
        job.callback_url = callback_url;
        match self.jobs.enqueue(job).await {
            Ok(_) => RunOutcome::Done,
            Err(err) => RunOutcome::Retry(format!("queueing comprobante job: {err}")),
        }
    }
}

fn retry_from(err: AuthorityError) -> RunOutcome {
    RunOutcome::Retry(err.to_string())
}
