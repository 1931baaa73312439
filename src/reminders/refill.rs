//! Refill sweeper: alerts owners of medications running low.

use std::sync::Arc;

use chrono::NaiveDateTime;

use super::error::ReminderError;
use super::messages::Notice;
use super::notifier::deliver;
use super::traits::{MedicationReader, NotificationChannels, RefillAlertLog, UserReader};
use super::types::{EngineConfig, RefillSummary};
use crate::models::Medication;

/// Alert every refill-tracked medication at or below its threshold.
///
/// With `refill_alert_once_per_day` set, a medication already alerted today
/// is skipped and each alert is logged in `refill_log`.
pub fn check_refills(
    medications: &dyn MedicationReader,
    users: &dyn UserReader,
    refill_log: &dyn RefillAlertLog,
    channels: &Arc<dyn NotificationChannels>,
    config: &EngineConfig,
    now: NaiveDateTime,
) -> Result<RefillSummary, ReminderError> {
    let tracked = medications.list_refill_tracked()?;
    let mut summary = RefillSummary {
        tracked: tracked.len(),
        ..Default::default()
    };

    for medication in tracked.iter().filter(|m| m.needs_refill()) {
        match alert_one(users, refill_log, channels, config, now, medication) {
            Ok(true) => summary.alerted += 1,
            Ok(false) => summary.suppressed += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    medication_id = %medication.id,
                    error = %e,
                    "Failed to raise refill alert, continuing"
                );
            }
        }
    }

    if summary.alerted > 0 || summary.failed > 0 {
        tracing::info!(
            alerted = summary.alerted,
            suppressed = summary.suppressed,
            failed = summary.failed,
            "Refill check finished"
        );
    }

    Ok(summary)
}

/// `Ok(false)` when suppressed because today's alert already went out.
fn alert_one(
    users: &dyn UserReader,
    refill_log: &dyn RefillAlertLog,
    channels: &Arc<dyn NotificationChannels>,
    config: &EngineConfig,
    now: NaiveDateTime,
    medication: &Medication,
) -> Result<bool, ReminderError> {
    let today = now.date();
    if config.refill_alert_once_per_day && refill_log.already_alerted(&medication.id, today)? {
        return Ok(false);
    }

    let user = users
        .get_user(&medication.user_id)?
        .ok_or(ReminderError::NotFound {
            entity_type: "User",
            id: medication.user_id,
        })?;
    let remaining = medication
        .refill_reminder
        .as_ref()
        .map_or(0.0, |r| r.remaining_quantity);

    deliver(
        channels,
        config.send_timeout,
        &user,
        Notice::RefillNeeded {
            medication,
            remaining,
        },
    );

    if config.refill_alert_once_per_day {
        refill_log.record_alert(&medication.id, today, &now)?;
    }
    tracing::debug!(medication_id = %medication.id, remaining, "Refill alert raised");
    Ok(true)
}
