//! Due-reminder dispatcher.
//!
//! Attempt-once semantics: after a notification attempt the reminder is
//! marked sent with the channels tried, whether or not they succeeded.
//! A failed channel is logged and never retried for that occurrence.

use std::sync::Arc;

use chrono::NaiveDateTime;

use super::error::ReminderError;
use super::messages::Notice;
use super::notifier::deliver;
use super::traits::{MedicationReader, NotificationChannels, ReminderStore, UserReader};
use super::types::{DispatchSummary, EngineConfig};
use crate::models::enums::ReminderStatus;
use crate::models::{Reminder, ReminderMutation};

/// Notify every pending, un-notified reminder scheduled in
/// `[now, now + dispatch_window]`.
pub fn dispatch_due_reminders(
    reminders: &dyn ReminderStore,
    medications: &dyn MedicationReader,
    users: &dyn UserReader,
    channels: &Arc<dyn NotificationChannels>,
    config: &EngineConfig,
    now: NaiveDateTime,
) -> Result<DispatchSummary, ReminderError> {
    let due = reminders.find_due_for_notification(&now, &(now + config.dispatch_window))?;
    let mut summary = DispatchSummary {
        due: due.len(),
        ..Default::default()
    };

    for reminder in &due {
        match dispatch_one(reminders, medications, users, channels, config, now, reminder) {
            Ok(Outcome::Notified { failed_sends }) => {
                summary.notified += 1;
                summary.failed_sends += failed_sends;
            }
            Ok(Outcome::Changed { failed_sends }) => {
                summary.skipped += 1;
                summary.failed_sends += failed_sends;
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    reminder_id = %reminder.id,
                    error = %e,
                    "Failed to dispatch reminder, continuing"
                );
            }
        }
    }

    if summary.due > 0 {
        tracing::info!(
            due = summary.due,
            notified = summary.notified,
            skipped = summary.skipped,
            failed = summary.failed,
            failed_sends = summary.failed_sends,
            "Reminder dispatch finished"
        );
    }

    Ok(summary)
}

enum Outcome {
    Notified { failed_sends: usize },
    /// Sent, but by write time the record had left `pending`, was already
    /// notified, or had been moved to another slot.
    Changed { failed_sends: usize },
}

fn dispatch_one(
    reminders: &dyn ReminderStore,
    medications: &dyn MedicationReader,
    users: &dyn UserReader,
    channels: &Arc<dyn NotificationChannels>,
    config: &EngineConfig,
    now: NaiveDateTime,
    reminder: &Reminder,
) -> Result<Outcome, ReminderError> {
    let user = users
        .get_user(&reminder.user_id)?
        .ok_or(ReminderError::NotFound {
            entity_type: "User",
            id: reminder.user_id,
        })?;
    let medication = medications
        .get_medication(&reminder.medication_id)?
        .ok_or(ReminderError::NotFound {
            entity_type: "Medication",
            id: reminder.medication_id,
        })?;

    let report = deliver(
        channels,
        config.send_timeout,
        &user,
        Notice::DoseDue {
            reminder,
            medication: &medication,
        },
    );
    let failed_sends = report.failed.len();

    let recorded = reminders.conditional_update(
        &reminder.id,
        ReminderStatus::Pending,
        &ReminderMutation::RecordNotification {
            at: now,
            scheduled_time: reminder.scheduled_time,
            channels: report.attempted,
        },
    )?;

    if recorded {
        tracing::debug!(reminder_id = %reminder.id, "Reminder notification recorded");
        Ok(Outcome::Notified { failed_sends })
    } else {
        tracing::debug!(
            reminder_id = %reminder.id,
            "Reminder changed during dispatch, notification not recorded"
        );
        Ok(Outcome::Changed { failed_sends })
    }
}
