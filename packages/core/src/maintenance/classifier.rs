//! Control Classifier
//!
//! Splits pending controls into `overdue` (due strictly before `now`) and
//! `upcoming` (due in `[now, now + horizon]`). Completed and cancelled
//! controls never appear in either set.

use chrono::{DateTime, Duration, Utc};

use crate::maintenance::types::{ClassifiedControls, MaintenanceControl};

/// Pure classification of `controls` relative to `now`.
///
/// Both output sets are sorted by `(due_date, id)`. A negative `horizon`
/// behaves like zero.
pub fn classify(
    controls: &[MaintenanceControl],
    now: DateTime<Utc>,
    horizon: Duration,
) -> ClassifiedControls {
    let horizon = horizon.max(Duration::zero());
    let horizon_end = now.checked_add_signed(horizon).unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut classified = ClassifiedControls::default();

    for control in controls.iter().filter(|c| c.is_pending()) {
        if control.due_date < now {
            classified.overdue.push(control.clone());
        } else if control.due_date <= horizon_end {
            classified.upcoming.push(control.clone());
        }
    }

    classified.overdue.sort_by_key(|c| (c.due_date, c.id));
    classified.upcoming.sort_by_key(|c| (c.due_date, c.id));

    classified
}
