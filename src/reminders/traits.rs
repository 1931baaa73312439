//! Collaborator seams of the reminder engine.
//!
//! - MedicationReader: active medications and their schedules (read-only)
//! - ReminderStore: reminder instances and their conditional lifecycle writes
//! - UserReader: notification preferences and reachability (read-only)
//! - RefillAlertLog: which refill alerts already went out today
//! - NotificationChannels: email / SMS / push transports
//! - Clock: the single process-wide notion of "now"

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::error::{NotificationError, ReminderError};
use super::messages::{EmailMessage, PushMessage};
use crate::models::enums::ReminderStatus;
use crate::models::*;

pub trait MedicationReader: Send + Sync {
    fn list_active(&self) -> Result<Vec<Medication>, ReminderError>;

    fn get_medication(&self, id: &Uuid) -> Result<Option<Medication>, ReminderError>;

    /// Active medications with refill tracking enabled.
    fn list_refill_tracked(&self) -> Result<Vec<Medication>, ReminderError> {
        Ok(self
            .list_active()?
            .into_iter()
            .filter(|m| m.refill_reminder.as_ref().is_some_and(|r| r.enabled))
            .collect())
    }
}

pub trait ReminderStore: Send + Sync {
    fn find_by_key(
        &self,
        user_id: &Uuid,
        medication_id: &Uuid,
        scheduled_time: &NaiveDateTime,
    ) -> Result<Option<Reminder>, ReminderError>;

    /// Persist a new reminder. Fails with `DuplicateSlot` if the
    /// `(user, medication, scheduled_time)` key is taken.
    fn create(&self, reminder: Reminder) -> Result<Reminder, ReminderError>;

    fn get(&self, id: &Uuid) -> Result<Option<Reminder>, ReminderError>;

    /// Pending, un-notified reminders scheduled within `[from, to]`.
    fn find_due_for_notification(
        &self,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError>;

    /// Pending reminders scheduled strictly before `older_than`.
    fn find_overdue(&self, older_than: &NaiveDateTime) -> Result<Vec<Reminder>, ReminderError>;

    /// Apply `mutation` iff the record's status is still `expected`.
    /// `Ok(false)` means the precondition failed; nothing was written.
    fn conditional_update(
        &self,
        id: &Uuid,
        expected: ReminderStatus,
        mutation: &ReminderMutation,
    ) -> Result<bool, ReminderError>;

    fn list_for_user(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError>;

    fn list_upcoming(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<Reminder>, ReminderError>;

    fn count_by_status(
        &self,
        user_id: &Uuid,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<(ReminderStatus, u32)>, ReminderError>;
}

pub trait UserReader: Send + Sync {
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, ReminderError>;
}

pub trait RefillAlertLog: Send + Sync {
    fn already_alerted(&self, medication_id: &Uuid, date: NaiveDate) -> Result<bool, ReminderError>;

    fn record_alert(
        &self,
        medication_id: &Uuid,
        date: NaiveDate,
        at: &NaiveDateTime,
    ) -> Result<(), ReminderError>;
}

/// Outbound transports. Fire-and-forget from the engine's point of view:
/// a returned error is logged and the attempt still counts.
pub trait NotificationChannels: Send + Sync {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError>;

    fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError>;

    fn send_push(&self, user_id: &Uuid, message: &PushMessage) -> Result<(), NotificationError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}
