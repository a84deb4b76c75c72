//! Reconciliation sweeper for sales stuck at `PROCESSING`.
//!
//! A sale can get stuck two ways: its submission was acknowledged but the
//! worker died before seeing the verdict, or its voucher job was never
//! created at all. The sweep handles both: submitted sales are reconciled
//! against the authority's answer, never-submitted ones get a fresh
//! `create_voucher` job. Transitions go through the store's
//! `apply_sri_update`, so a sweep racing the worker over the same sale is
//! harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use vendia_sales::SriStatus;

use crate::jobs::{InvoiceJob, JobKind, JobStore};
use crate::store::{PosStore, SriUpdate, StoreError};
use vendia_billing::TaxAuthority;

/// How many sales one sweep will look at.
const SWEEP_BATCH: i64 = 100;

/// What a single sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub authorized: usize,
    pub rejected: usize,
    pub still_pending: usize,
    /// Stuck sales with no access key that were re-queued for submission.
    pub resubmitted: usize,
}

/// Reconcile every sale that has sat at `PROCESSING` longer than
/// `threshold`.
///
/// Per-sale authority failures are logged and skipped; the sale stays in
/// the queue for the next sweep. Only a store failure aborts the sweep.
pub async fn sweep_once(
    store: &dyn PosStore,
    jobs: &dyn JobStore,
    authority: &dyn TaxAuthority,
    threshold: Duration,
) -> Result<SweepOutcome, StoreError> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::seconds(300));
    let stuck = store.sales_processing_before(cutoff, SWEEP_BATCH).await?;

    let mut outcome = SweepOutcome {
        scanned: stuck.len(),
        ..SweepOutcome::default()
    };

    for sale in stuck {
        let Some(access_key) = sale.clave_acceso.clone() else {
            // Never submitted: the voucher job was lost. Queue a new one;
            // the handler is idempotent if one sneaks through twice.
            let job = InvoiceJob::create_voucher(sale.id);
            if let Err(err) = jobs.enqueue(job).await {
                warn!(sale_id = %sale.id, error = %err, "sweep could not re-queue submission");
            } else {
                outcome.resubmitted += 1;
            }
            continue;
        };

        let status = match authority.fetch_status(&access_key).await {
            Ok(status) => status,
            Err(err) => {
                warn!(sale_id = %sale.id, error = %err, "sweep status poll failed");
                outcome.still_pending += 1;
                continue;
            }
        };

        let updated = store
            .apply_sri_update(sale.id, SriUpdate::Observed { status })
            .await?;
        match updated.estado_sri {
            SriStatus::Authorized => outcome.authorized += 1,
            SriStatus::Error => outcome.rejected += 1,
            SriStatus::Processing => outcome.still_pending += 1,
            SriStatus::NoElectronic => {}
        }
    }

    info!(
        scanned = outcome.scanned,
        authorized = outcome.authorized,
        rejected = outcome.rejected,
        still_pending = outcome.still_pending,
        resubmitted = outcome.resubmitted,
        "sweep finished"
    );
    Ok(outcome)
}

/// Periodically queue a `check_pending_vouchers` job.
///
/// The timer only enqueues; the pipeline worker executes the sweep like any
/// other job. A new sweep is never queued while one is still pending or
/// running, so slow sweeps cannot stack.
pub fn spawn_sweep_timer(
    jobs: Arc<dyn JobStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh boot does
        // not sweep before the worker is even polling.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match jobs.has_live(JobKind::CheckPendingVouchers).await {
                Ok(true) => {
                    debug!("previous sweep still live, skipping tick");
                }
                Ok(false) => {
                    if let Err(err) = jobs.enqueue(InvoiceJob::check_pending_vouchers()).await {
                        warn!(error = %err, "could not queue sweep job");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "could not check for a live sweep job");
                }
            }
        }
    })
}
