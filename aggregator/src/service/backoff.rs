use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::queue::{BundleRow, BundleStatus, DatabaseError, QueryGroup};
use crate::utils::metrics::AGGREGATOR_METRICS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackoffOutcome {
    Requeued { eligible_after: u64 },
    Dropped,
    /// The row left the table while it was being processed.
    Missing,
}

/// Pushes a failed row back by its current eligibility delay and doubles the delay,
/// or drops it once the doubled delay would pass `max_eligibility_delay`.
pub(crate) fn apply_backoff(
    group: &mut QueryGroup,
    mut row: BundleRow,
    reason: &str,
    current_block: u64,
    max_eligibility_delay: u64,
    retain_history: bool,
) -> Result<BackoffOutcome, DatabaseError> {
    let next_delay = row.next_eligibility_delay.saturating_mul(2);
    row.submit_error = Some(reason.to_string());

    if next_delay > max_eligibility_delay {
        warn!(row_id = row.id, hash = %row.hash, reason, "Dropping bundle after repeated failures");
        AGGREGATOR_METRICS.rows_dropped.add(1, &[KeyValue::new("retained", retain_history)]);
        if retain_history {
            row.status = BundleStatus::Failed;
            return update_or_missing(group, &row, BackoffOutcome::Dropped);
        }
        return Ok(if group.remove(&[row.id])? == 0 { BackoffOutcome::Missing } else { BackoffOutcome::Dropped });
    }

    row.eligible_after = current_block.saturating_add(row.next_eligibility_delay);
    row.next_eligibility_delay = next_delay;
    debug!(
        row_id = row.id,
        eligible_after = row.eligible_after,
        next_eligibility_delay = row.next_eligibility_delay,
        reason,
        "Requeued bundle"
    );
    AGGREGATOR_METRICS.rows_requeued.add(1, &[]);
    let eligible_after = row.eligible_after;
    update_or_missing(group, &row, BackoffOutcome::Requeued { eligible_after })
}

fn update_or_missing(
    group: &mut QueryGroup,
    row: &BundleRow,
    outcome: BackoffOutcome,
) -> Result<BackoffOutcome, DatabaseError> {
    match group.update(row) {
        Ok(()) => Ok(outcome),
        Err(DatabaseError::RowNotFound(id)) => {
            debug!(row_id = id, "Row removed before backoff could be applied");
            Ok(BackoffOutcome::Missing)
        }
        Err(e) => Err(e),
    }
}
