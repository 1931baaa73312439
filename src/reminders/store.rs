//! SQLite-backed implementation of every engine store trait.
//!
//! One connection behind a mutex; each trait call holds the lock for a
//! single statement, so sweeps on different timers interleave per record.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::ReminderError;
use super::traits::{MedicationReader, RefillAlertLog, ReminderStore, UserReader};
use crate::db::{self, DatabaseError};
use crate::models::enums::ReminderStatus;
use crate::models::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) the database file at `path`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, ReminderError> {
        let conn = db::open_database(path, busy_timeout)?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, ReminderError> {
        let conn = db::open_memory_database()?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` against the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, ReminderError> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ReminderError> {
        self.conn
            .lock()
            .map_err(|_| ReminderError::Database(DatabaseError::LockPoisoned))
    }
}

impl MedicationReader for SqliteStore {
    fn list_active(&self) -> Result<Vec<Medication>, ReminderError> {
        self.with_connection(db::get_active_medications)
    }

    fn get_medication(&self, id: &Uuid) -> Result<Option<Medication>, ReminderError> {
        self.with_connection(|conn| db::get_medication(conn, id))
    }

    fn list_refill_tracked(&self) -> Result<Vec<Medication>, ReminderError> {
        self.with_connection(db::get_refill_tracked_medications)
    }
}

impl ReminderStore for SqliteStore {
    fn find_by_key(
        &self,
        user_id: &Uuid,
        medication_id: &Uuid,
        scheduled_time: &NaiveDateTime,
    ) -> Result<Option<Reminder>, ReminderError> {
        self.with_connection(|conn| {
            db::find_reminder_by_key(conn, user_id, medication_id, scheduled_time)
        })
    }

    fn create(&self, reminder: Reminder) -> Result<Reminder, ReminderError> {
        let conn = self.lock()?;
        match db::insert_reminder(&conn, &reminder) {
            Ok(()) => Ok(reminder),
            Err(DatabaseError::ConstraintViolation(_)) => Err(ReminderError::DuplicateSlot {
                medication_id: reminder.medication_id,
                scheduled_time: reminder.scheduled_time,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &Uuid) -> Result<Option<Reminder>, ReminderError> {
        self.with_connection(|conn| db::get_reminder(conn, id))
    }

    fn find_due_for_notification(
        &self,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.with_connection(|conn| db::find_due_for_notification(conn, from, to))
    }

    fn find_overdue(&self, older_than: &NaiveDateTime) -> Result<Vec<Reminder>, ReminderError> {
        self.with_connection(|conn| db::find_overdue(conn, older_than))
    }

    fn conditional_update(
        &self,
        id: &Uuid,
        expected: ReminderStatus,
        mutation: &ReminderMutation,
    ) -> Result<bool, ReminderError> {
        self.with_connection(|conn| db::conditional_update_reminder(conn, id, expected, mutation))
    }

    fn list_for_user(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.with_connection(|conn| db::list_user_reminders_between(conn, user_id, from, to))
    }

    fn list_upcoming(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.with_connection(|conn| db::list_user_upcoming(conn, user_id, from, to, limit))
    }

    fn count_by_status(
        &self,
        user_id: &Uuid,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<(ReminderStatus, u32)>, ReminderError> {
        self.with_connection(|conn| db::count_user_reminders_by_status(conn, user_id, range))
    }
}

impl UserReader for SqliteStore {
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, ReminderError> {
        self.with_connection(|conn| db::get_user(conn, id))
    }
}

impl RefillAlertLog for SqliteStore {
    fn already_alerted(&self, medication_id: &Uuid, date: NaiveDate) -> Result<bool, ReminderError> {
        self.with_connection(|conn| db::has_refill_alert(conn, medication_id, date))
    }

    fn record_alert(
        &self,
        medication_id: &Uuid,
        date: NaiveDate,
        at: &NaiveDateTime,
    ) -> Result<(), ReminderError> {
        self.with_connection(|conn| db::record_refill_alert(conn, medication_id, date, at))?;
        Ok(())
    }
}
