use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NotificationChannel, ReminderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageTaken {
    pub amount: f64,
    pub unit: String,
}

/// One concrete occurrence of "take this medication at this time".
///
/// `(user_id, medication_id, scheduled_time)` is unique across the store.
/// The notification fields describe the current `scheduled_time` only and
/// are cleared whenever it moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub status: ReminderStatus,
    pub notification_sent: bool,
    pub notification_sent_at: Option<NaiveDateTime>,
    pub notification_channels: BTreeSet<NotificationChannel>,
    pub taken_at: Option<NaiveDateTime>,
    pub missed_at: Option<NaiveDateTime>,
    pub snooze_until: Option<NaiveDateTime>,
    pub dosage_taken: Option<DosageTaken>,
    pub notes: Option<String>,
}

impl Reminder {
    /// A fresh pending reminder for one schedule slot.
    pub fn pending(user_id: Uuid, medication_id: Uuid, scheduled_time: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            medication_id,
            scheduled_time,
            status: ReminderStatus::Pending,
            notification_sent: false,
            notification_sent_at: None,
            notification_channels: BTreeSet::new(),
            taken_at: None,
            missed_at: None,
            snooze_until: None,
            dosage_taken: None,
            notes: None,
        }
    }
}

/// A single-record lifecycle write, applied only while the record is still
/// in the expected status.
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderMutation {
    MarkTaken {
        at: NaiveDateTime,
        dosage: Option<DosageTaken>,
        notes: Option<String>,
    },
    MarkSkipped {
        notes: Option<String>,
    },
    MarkMissed {
        at: NaiveDateTime,
    },
    /// Move the slot forward and re-arm it for dispatch.
    Snooze {
        until: NaiveDateTime,
    },
    /// Only lands on the occurrence that was announced: `scheduled_time` is
    /// the slot the dispatcher read.
    RecordNotification {
        at: NaiveDateTime,
        scheduled_time: NaiveDateTime,
        channels: BTreeSet<NotificationChannel>,
    },
}

impl ReminderMutation {
    /// Status the record holds after the write.
    pub fn target_status(&self) -> ReminderStatus {
        match self {
            Self::MarkTaken { .. } => ReminderStatus::Taken,
            Self::MarkSkipped { .. } => ReminderStatus::Skipped,
            Self::MarkMissed { .. } => ReminderStatus::Missed,
            Self::Snooze { .. } | Self::RecordNotification { .. } => ReminderStatus::Pending,
        }
    }

    /// Apply to an in-memory copy. Mirrors the SQL the store runs.
    pub fn apply(&self, reminder: &mut Reminder) {
        match self {
            Self::MarkTaken { at, dosage, notes } => {
                reminder.status = ReminderStatus::Taken;
                reminder.taken_at = Some(*at);
                if dosage.is_some() {
                    reminder.dosage_taken = dosage.clone();
                }
                if notes.is_some() {
                    reminder.notes = notes.clone();
                }
            }
            Self::MarkSkipped { notes } => {
                reminder.status = ReminderStatus::Skipped;
                if notes.is_some() {
                    reminder.notes = notes.clone();
                }
            }
            Self::MarkMissed { at } => {
                reminder.status = ReminderStatus::Missed;
                reminder.missed_at = Some(*at);
            }
            Self::Snooze { until } => {
                reminder.status = ReminderStatus::Pending;
                reminder.scheduled_time = *until;
                reminder.snooze_until = Some(*until);
                reminder.notification_sent = false;
                reminder.notification_sent_at = None;
                reminder.notification_channels.clear();
            }
            Self::RecordNotification { at, scheduled_time, channels } => {
                if reminder.scheduled_time != *scheduled_time || reminder.notification_sent {
                    return;
                }
                reminder.notification_sent = true;
                reminder.notification_sent_at = Some(*at);
                reminder.notification_channels = channels.clone();
            }
        }
    }
}
