//! SLA deadline policy.

use chrono::{DateTime, Duration, Utc};
use quickdesk_storage::{DeadlineSettings, Priority};

/// Compute the due-by timestamp for a priority.
///
/// Returns `None` when the priority is `None`, when the organization has no
/// settings, or when the configured lead time is zero. A lead time that
/// lands past the representable calendar also yields `None`. Pure; the
/// caller persists and logs the result.
pub fn compute_deadline(
    priority: Priority,
    settings: Option<&DeadlineSettings>,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !priority.is_ranked() {
        return None;
    }
    match settings?.lead_days(priority) {
        0 => None,
        days => Duration::try_days(i64::from(days))
            .and_then(|lead| reference.checked_add_signed(lead)),
    }
}
