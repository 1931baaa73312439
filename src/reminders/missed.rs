//! Missed-reminder sweeper.
//!
//! Sends nothing. Each transition is conditional on the record still being
//! `pending`, so a dose marked taken between the read and the write stays
//! taken.

use chrono::NaiveDateTime;

use super::error::ReminderError;
use super::traits::ReminderStore;
use super::types::{EngineConfig, MissedSummary};
use crate::models::enums::ReminderStatus;
use crate::models::ReminderMutation;

/// Mark every pending reminder scheduled before `now - grace_period` missed.
pub fn sweep_missed_reminders(
    store: &dyn ReminderStore,
    config: &EngineConfig,
    now: NaiveDateTime,
) -> Result<MissedSummary, ReminderError> {
    let overdue = store.find_overdue(&(now - config.grace_period))?;
    let mut summary = MissedSummary {
        overdue: overdue.len(),
        ..Default::default()
    };

    let mutation = ReminderMutation::MarkMissed { at: now };
    for reminder in &overdue {
        match store.conditional_update(&reminder.id, ReminderStatus::Pending, &mutation) {
            Ok(true) => summary.marked_missed += 1,
            Ok(false) => {
                summary.skipped += 1;
                tracing::debug!(
                    reminder_id = %reminder.id,
                    "Reminder left pending before missed sweep could apply"
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    reminder_id = %reminder.id,
                    error = %e,
                    "Failed to mark reminder missed, continuing"
                );
            }
        }
    }

    if summary.overdue > 0 {
        tracing::info!(
            marked_missed = summary.marked_missed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Missed reminder sweep finished"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminders::lifecycle;
    use crate::reminders::test_support::{at, TestEnv};

    #[test]
    fn grace_boundary() {
        let env = TestEnv::at(at(9, 0));
        let owner = env.add_user("grace@example.com");
        let med = env.add_medication(&owner, "Metformin", &[]);
        let reminder = env.add_reminder(&owner, &med, at(9, 0));
        let config = EngineConfig::default();

        let summary = sweep_missed_reminders(env.store.as_ref(), &config, at(9, 29)).unwrap();
        assert_eq!(summary.marked_missed, 0);
        assert_eq!(env.reminder(&reminder.id).status, ReminderStatus::Pending);

        // Exactly at the grace period the reminder is not yet older than it.
        let summary = sweep_missed_reminders(env.store.as_ref(), &config, at(9, 30)).unwrap();
        assert_eq!(summary.marked_missed, 0);

        let summary = sweep_missed_reminders(env.store.as_ref(), &config, at(9, 31)).unwrap();
        assert_eq!(summary.marked_missed, 1);
        let stored = env.reminder(&reminder.id);
        assert_eq!(stored.status, ReminderStatus::Missed);
        assert_eq!(stored.missed_at, Some(at(9, 31)));
    }

    #[test]
    fn rerun_is_a_no_op() {
        let env = TestEnv::at(at(10, 0));
        let owner = env.add_user("rerun@example.com");
        let med = env.add_medication(&owner, "Metformin", &[]);
        let reminder = env.add_reminder(&owner, &med, at(9, 0));
        let config = EngineConfig::default();

        sweep_missed_reminders(env.store.as_ref(), &config, at(10, 0)).unwrap();
        let summary = sweep_missed_reminders(env.store.as_ref(), &config, at(10, 5)).unwrap();
        assert_eq!(summary.overdue, 0);
        assert_eq!(env.reminder(&reminder.id).missed_at, Some(at(10, 0)));
    }

    #[test]
    fn taken_between_read_and_write_stays_taken() {
        let env = TestEnv::at(at(9, 35));
        let owner = env.add_user("race@example.com");
        let med = env.add_medication(&owner, "Metformin", &[]);
        let reminder = env.add_reminder(&owner, &med, at(9, 0));

        // The sweep has read the record as overdue...
        let overdue = env.store.find_overdue(&at(9, 5)).unwrap();
        assert_eq!(overdue.len(), 1);

        // ...the user acts...
        lifecycle::mark_taken(env.store.as_ref(), at(9, 35), &reminder.id, None, None).unwrap();

        // ...and the sweep's conditional write finds nothing to do.
        let applied = env
            .store
            .conditional_update(
                &reminder.id,
                ReminderStatus::Pending,
                &ReminderMutation::MarkMissed { at: at(9, 35) },
            )
            .unwrap();
        assert!(!applied);
        assert_eq!(env.reminder(&reminder.id).status, ReminderStatus::Taken);

        let summary =
            sweep_missed_reminders(env.store.as_ref(), &EngineConfig::default(), at(9, 36)).unwrap();
        assert_eq!(summary.marked_missed, 0);
        assert_eq!(env.reminder(&reminder.id).status, ReminderStatus::Taken);
    }
}
