//! Daily instance generator: materialises today's schedule slots.
//!
//! Safe to run any number of times per day: each candidate slot is looked
//! up by `(user, medication, scheduled_time)` before it is created, and the
//! store's unique key turns a lost race into a no-op.

use chrono::{Datelike, NaiveDateTime};

use super::error::ReminderError;
use super::traits::{MedicationReader, ReminderStore};
use super::types::GenerationSummary;
use crate::models::enums::DayOfWeek;
use crate::models::{Medication, Reminder};

/// Create pending reminders for every active medication's slots later today.
///
/// A failure on one medication is logged and does not stop the others.
pub fn generate_daily_reminders(
    medications: &dyn MedicationReader,
    store: &dyn ReminderStore,
    now: NaiveDateTime,
) -> Result<GenerationSummary, ReminderError> {
    let active = medications.list_active()?;
    let mut summary = GenerationSummary {
        medications: active.len(),
        ..Default::default()
    };

    for medication in &active {
        if let Err(e) = generate_for_medication(store, medication, now, &mut summary) {
            summary.failed_medications += 1;
            tracing::warn!(
                medication_id = %medication.id,
                error = %e,
                "Failed to generate reminders for medication, continuing"
            );
        }
    }

    if summary.created > 0 || summary.failed_medications > 0 {
        tracing::info!(
            created = summary.created,
            already_present = summary.already_present,
            failed = summary.failed_medications,
            "Daily reminder generation finished"
        );
    }

    Ok(summary)
}

fn generate_for_medication(
    store: &dyn ReminderStore,
    medication: &Medication,
    now: NaiveDateTime,
    summary: &mut GenerationSummary,
) -> Result<(), ReminderError> {
    let today = now.date();
    if !medication.covers(today) {
        return Ok(());
    }
    let weekday = DayOfWeek::from(today.weekday());

    for entry in &medication.schedule {
        if !entry.applies_on(weekday) {
            continue;
        }

        let time = match entry.parse_time() {
            Ok(t) => t,
            Err(reason) => {
                summary.invalid_entries += 1;
                let e = ReminderError::Schedule {
                    medication_id: medication.id,
                    time: entry.time.clone(),
                    reason,
                };
                tracing::warn!(error = %e, "Skipping malformed schedule entry");
                continue;
            }
        };

        let scheduled_time = today.and_time(time);
        if scheduled_time <= now {
            summary.in_the_past += 1;
            continue;
        }

        if store
            .find_by_key(&medication.user_id, &medication.id, &scheduled_time)?
            .is_some()
        {
            summary.already_present += 1;
            continue;
        }

        match store.create(Reminder::pending(medication.user_id, medication.id, scheduled_time)) {
            Ok(reminder) => {
                summary.created += 1;
                tracing::debug!(
                    reminder_id = %reminder.id,
                    medication = %medication.name,
                    scheduled_time = %scheduled_time,
                    "Created reminder"
                );
            }
            Err(ReminderError::DuplicateSlot { .. }) => {
                summary.already_present += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
