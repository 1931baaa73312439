//! Read-only reporting over the reminder store.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::error::ReminderError;
use super::traits::ReminderStore;
use super::types::AdherenceStats;
use crate::models::enums::ReminderStatus;
use crate::models::Reminder;

/// Counts per status for `user_id`, optionally limited to `[from, to]`.
pub fn adherence_stats(
    store: &dyn ReminderStore,
    user_id: &Uuid,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<AdherenceStats, ReminderError> {
    if let Some((from, to)) = range {
        if from > to {
            return Err(ReminderError::Validation(format!(
                "range start {from} is after range end {to}"
            )));
        }
    }

    let by_status: std::collections::BTreeMap<_, _> =
        store.count_by_status(user_id, range)?.into_iter().collect();
    let total: u32 = by_status.values().sum();
    let taken = by_status.get(&ReminderStatus::Taken).copied().unwrap_or(0);

    Ok(AdherenceStats {
        by_status,
        total,
        taken,
        adherence_rate: adherence_rate(taken, total),
    })
}

/// `taken / total` as a percentage rounded to two decimals.
pub fn adherence_rate(taken: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = f64::from(taken) / f64::from(total) * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Every reminder for `user_id` scheduled on the calendar day of `now`.
pub fn reminders_for_day(
    store: &dyn ReminderStore,
    user_id: &Uuid,
    now: NaiveDateTime,
) -> Result<Vec<Reminder>, ReminderError> {
    let start = now.date().and_time(NaiveTime::MIN);
    let end = start + Duration::days(1) - Duration::seconds(1);
    store.list_for_user(user_id, &start, &end)
}

/// Pending reminders for `user_id` in the next `days`, earliest first.
pub fn upcoming_reminders(
    store: &dyn ReminderStore,
    user_id: &Uuid,
    now: NaiveDateTime,
    days: i64,
    limit: u32,
) -> Result<Vec<Reminder>, ReminderError> {
    store.list_upcoming(user_id, &now, &(now + Duration::days(days)), limit)
}
