//! Shared fixtures for engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::clock::FixedClock;
use super::engine::{Collaborators, ReminderEngine};
use super::error::{NotificationError, ReminderError};
use super::messages::{EmailMessage, PushMessage};
use super::store::SqliteStore;
use super::traits::*;
use super::types::EngineConfig;
use crate::db::{self, DatabaseError};
use crate::models::enums::{NotificationChannel, ReminderStatus};
use crate::models::*;

/// 2024-03-04 (a Monday) at `h:m`.
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// Email and push enabled, no phone on file.
pub fn user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        first_name: "Alex".into(),
        email: email.into(),
        phone: None,
        is_phone_verified: false,
        notification_preferences: NotificationPreferences::default(),
    }
}

/// Active, daily at each of `times`, no refill tracking.
pub fn medication(user_id: Uuid, name: &str, times: &[&str]) -> Medication {
    Medication {
        id: Uuid::new_v4(),
        user_id,
        name: name.into(),
        dosage: Dosage { amount: 500.0, unit: "mg".into() },
        instructions: None,
        schedule: times.iter().map(|t| ScheduleEntry::daily(t)).collect(),
        start_date: None,
        end_date: None,
        refill_reminder: None,
        is_active: true,
    }
}

// ═══════════════════════════════════════════
// Recording transport
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Email { to: String, subject: String },
    Sms { phone: String, text: String },
    Push { user_id: Uuid, title: String, body: String },
}

impl SentMessage {
    pub fn channel(&self) -> NotificationChannel {
        match self {
            Self::Email { .. } => NotificationChannel::Email,
            Self::Sms { .. } => NotificationChannel::Sms,
            Self::Push { .. } => NotificationChannel::Push,
        }
    }
}

/// Captures every send. Can be told to fail one channel or to stall.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: Option<NotificationChannel>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(channel: NotificationChannel) -> Self {
        Self {
            failing: Some(channel),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_on(&self, channel: NotificationChannel) -> usize {
        self.sent().iter().filter(|m| m.channel() == channel).count()
    }

    fn record(&self, message: SentMessage) -> Result<(), NotificationError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let channel = message.channel();
        self.sent.lock().unwrap().push(message);
        if self.failing == Some(channel) {
            return Err(NotificationError::Rejected(format!("{channel} provider down")));
        }
        Ok(())
    }
}

impl NotificationChannels for RecordingNotifier {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError> {
        self.record(SentMessage::Email {
            to: to.into(),
            subject: message.subject.clone(),
        })
    }

    fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError> {
        self.record(SentMessage::Sms {
            phone: phone.into(),
            text: text.into(),
        })
    }

    fn send_push(&self, user_id: &Uuid, message: &PushMessage) -> Result<(), NotificationError> {
        self.record(SentMessage::Push {
            user_id: *user_id,
            title: message.title.clone(),
            body: message.body.clone(),
        })
    }
}

// ═══════════════════════════════════════════
// Faulty collaborators
// ═══════════════════════════════════════════

/// Delegates to a real store but refuses to create reminders for one
/// medication.
pub struct FailingCreateStore {
    inner: Arc<SqliteStore>,
    medication_id: Uuid,
}

impl FailingCreateStore {
    pub fn new(inner: Arc<SqliteStore>, medication_id: Uuid) -> Self {
        Self { inner, medication_id }
    }
}

impl ReminderStore for FailingCreateStore {
    fn find_by_key(
        &self,
        user_id: &Uuid,
        medication_id: &Uuid,
        scheduled_time: &NaiveDateTime,
    ) -> Result<Option<Reminder>, ReminderError> {
        self.inner.find_by_key(user_id, medication_id, scheduled_time)
    }

    fn create(&self, reminder: Reminder) -> Result<Reminder, ReminderError> {
        if reminder.medication_id == self.medication_id {
            return Err(DatabaseError::ConstraintViolation("disk full".into()).into());
        }
        self.inner.create(reminder)
    }

    fn get(&self, id: &Uuid) -> Result<Option<Reminder>, ReminderError> {
        self.inner.get(id)
    }

    fn find_due_for_notification(
        &self,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.inner.find_due_for_notification(from, to)
    }

    fn find_overdue(&self, older_than: &NaiveDateTime) -> Result<Vec<Reminder>, ReminderError> {
        self.inner.find_overdue(older_than)
    }

    fn conditional_update(
        &self,
        id: &Uuid,
        expected: ReminderStatus,
        mutation: &ReminderMutation,
    ) -> Result<bool, ReminderError> {
        self.inner.conditional_update(id, expected, mutation)
    }

    fn list_for_user(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.inner.list_for_user(user_id, from, to)
    }

    fn list_upcoming(
        &self,
        user_id: &Uuid,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<Reminder>, ReminderError> {
        self.inner.list_upcoming(user_id, from, to, limit)
    }

    fn count_by_status(
        &self,
        user_id: &Uuid,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<(ReminderStatus, u32)>, ReminderError> {
        self.inner.count_by_status(user_id, range)
    }
}

/// Errors on lookups of one user; every other user comes from the store.
pub struct FailingUsers {
    inner: Arc<SqliteStore>,
    user_id: Uuid,
}

impl FailingUsers {
    pub fn new(inner: Arc<SqliteStore>, user_id: Uuid) -> Self {
        Self { inner, user_id }
    }
}

impl UserReader for FailingUsers {
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, ReminderError> {
        if *id == self.user_id {
            return Err(DatabaseError::LockPoisoned.into());
        }
        self.inner.get_user(id)
    }
}

// ═══════════════════════════════════════════
// Engine harness
// ═══════════════════════════════════════════

/// In-memory store, recording transport and a fixed clock wired into an
/// engine.
pub struct TestEnv {
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub engine: ReminderEngine,
}

impl TestEnv {
    pub fn at(now: NaiveDateTime) -> Self {
        Self::with_config(now, EngineConfig::default())
    }

    pub fn with_config(now: NaiveDateTime, config: EngineConfig) -> Self {
        Self::build(now, config, Arc::new(RecordingNotifier::new()))
    }

    pub fn with_notifier(now: NaiveDateTime, notifier: RecordingNotifier) -> Self {
        Self::build(now, EngineConfig::default(), Arc::new(notifier))
    }

    fn build(now: NaiveDateTime, config: EngineConfig, notifier: Arc<RecordingNotifier>) -> Self {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(now));
        let engine = ReminderEngine::new(
            Collaborators {
                medications: store.clone(),
                reminders: store.clone(),
                users: store.clone(),
                refill_log: store.clone(),
                channels: notifier.clone(),
                clock: clock.clone(),
            },
            config,
        )
        .unwrap();
        Self { store, notifier, clock, engine }
    }

    pub fn set_now(&self, now: NaiveDateTime) {
        self.clock.set(now);
    }

    pub fn add_user(&self, email: &str) -> User {
        let u = user(email);
        self.insert_user(&u);
        u
    }

    pub fn insert_user(&self, u: &User) {
        self.store.with_connection(|conn| db::insert_user(conn, u)).unwrap();
    }

    pub fn add_medication(&self, owner: &User, name: &str, times: &[&str]) -> Medication {
        let med = medication(owner.id, name, times);
        self.insert_medication(&med);
        med
    }

    pub fn insert_medication(&self, med: &Medication) {
        self.store
            .with_connection(|conn| db::insert_medication(conn, med))
            .unwrap();
    }

    /// Overwrite a stored JSON column with text the model no longer accepts.
    pub fn corrupt_medication(&self, id: &Uuid, column: &str, raw: &str) {
        self.store
            .with_connection(|conn| {
                conn.execute(
                    &format!("UPDATE medications SET {column} = ?1 WHERE id = ?2"),
                    rusqlite::params![raw, id.to_string()],
                )?;
                Ok(())
            })
            .unwrap();
    }

    pub fn reminder(&self, id: &Uuid) -> Reminder {
        self.store.get(id).unwrap().unwrap()
    }

    pub fn reminder_at(&self, owner: &User, med: &Medication, time: NaiveDateTime) -> Reminder {
        self.store.find_by_key(&owner.id, &med.id, &time).unwrap().unwrap()
    }

    /// Seed a pending reminder directly, bypassing the generator.
    pub fn add_reminder(&self, owner: &User, med: &Medication, time: NaiveDateTime) -> Reminder {
        self.store
            .create(Reminder::pending(owner.id, med.id, time))
            .unwrap()
    }

    pub fn all_reminders(&self, owner: &User) -> Vec<Reminder> {
        let from = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let to = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        self.store.list_for_user(&owner.id, &from, &to).unwrap()
    }
}
