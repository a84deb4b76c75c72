use vendia_sales::SriStatus;

use crate::authority::AuthorityStatus;

/// Fold the authority's observed status into the sale's current invoice
/// state.
///
/// Idempotent and monotonic: a terminal state is never demoted, applying the
/// same observation twice is a no-op, and `Pending` never moves anything.
/// Both the pipeline worker and the sweeper funnel every transition through
/// this function, which makes them safe to run concurrently.
pub fn reconcile(current: SriStatus, observed: &AuthorityStatus) -> SriStatus {
    if current.is_terminal() {
        return current;
    }
    match observed {
        AuthorityStatus::Pending => SriStatus::Processing,
        AuthorityStatus::Authorized { .. } => SriStatus::Authorized,
        AuthorityStatus::Rejected { .. } => SriStatus::Error,
    }
}
