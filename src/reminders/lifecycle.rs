//! Caller-initiated lifecycle transitions: taken, skipped, snoozed.
//!
//! Every transition is a conditional write from `pending`. When the record
//! has moved on (a sweep got there first, or the user acted twice) the
//! caller gets `InvalidTransition` carrying the status actually stored.

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use super::clock::minute_floor;
use super::error::ReminderError;
use super::traits::ReminderStore;
use crate::db::DatabaseError;
use crate::models::enums::ReminderStatus;
use crate::models::{DosageTaken, Reminder, ReminderMutation};

pub fn get_reminder(store: &dyn ReminderStore, id: &Uuid) -> Result<Reminder, ReminderError> {
    store.get(id)?.ok_or(ReminderError::NotFound {
        entity_type: "Reminder",
        id: *id,
    })
}

pub fn mark_taken(
    store: &dyn ReminderStore,
    now: NaiveDateTime,
    id: &Uuid,
    dosage: Option<DosageTaken>,
    notes: Option<String>,
) -> Result<Reminder, ReminderError> {
    if let Some(d) = &dosage {
        if !d.amount.is_finite() || d.amount < 0.0 {
            return Err(ReminderError::Validation(format!(
                "dosage amount must be a non-negative number, got {}",
                d.amount
            )));
        }
        if d.unit.trim().is_empty() {
            return Err(ReminderError::Validation("dosage unit is required".into()));
        }
    }

    transition(
        store,
        id,
        ReminderMutation::MarkTaken {
            at: now,
            dosage,
            notes: normalize_notes(notes),
        },
    )
}

pub fn mark_skipped(
    store: &dyn ReminderStore,
    id: &Uuid,
    notes: Option<String>,
) -> Result<Reminder, ReminderError> {
    transition(
        store,
        id,
        ReminderMutation::MarkSkipped {
            notes: normalize_notes(notes),
        },
    )
}

/// Push a pending reminder `minutes` past now and re-arm it for dispatch.
pub fn snooze(
    store: &dyn ReminderStore,
    now: NaiveDateTime,
    id: &Uuid,
    minutes: u32,
) -> Result<Reminder, ReminderError> {
    if minutes == 0 {
        return Err(ReminderError::Validation(
            "snooze minutes must be greater than zero".into(),
        ));
    }

    let until = minute_floor(now) + Duration::minutes(i64::from(minutes));
    match transition(store, id, ReminderMutation::Snooze { until }) {
        Err(ReminderError::Database(DatabaseError::ConstraintViolation(_))) => {
            let reminder = get_reminder(store, id)?;
            Err(ReminderError::DuplicateSlot {
                medication_id: reminder.medication_id,
                scheduled_time: until,
            })
        }
        other => other,
    }
}

fn transition(
    store: &dyn ReminderStore,
    id: &Uuid,
    mutation: ReminderMutation,
) -> Result<Reminder, ReminderError> {
    let current = get_reminder(store, id)?;
    let to = mutation.target_status();
    if current.status != ReminderStatus::Pending {
        return Err(ReminderError::InvalidTransition {
            from: current.status,
            to,
        });
    }

    if !store.conditional_update(id, ReminderStatus::Pending, &mutation)? {
        // Lost a race between the read above and the write.
        let latest = get_reminder(store, id)?;
        tracing::debug!(
            reminder_id = %id,
            status = latest.status.as_str(),
            "Reminder changed before transition could apply"
        );
        return Err(ReminderError::InvalidTransition {
            from: latest.status,
            to,
        });
    }

    let updated = get_reminder(store, id)?;
    tracing::info!(reminder_id = %id, status = updated.status.as_str(), "Reminder updated");
    Ok(updated)
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
