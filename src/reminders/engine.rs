//! `ReminderEngine`: facade over the sweeps and lifecycle operations.
//!
//! Holds every collaborator behind `Arc<dyn Trait>` plus the engine
//! configuration. Cheap to clone; the driver hands a clone to each
//! blocking sweep.

use std::sync::Arc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::error::ReminderError;
use super::traits::*;
use super::types::*;
use super::{dispatcher, generator, lifecycle, missed, refill, stats};
use crate::models::{DosageTaken, Reminder};

/// Everything the engine reads from or writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub medications: Arc<dyn MedicationReader>,
    pub reminders: Arc<dyn ReminderStore>,
    pub users: Arc<dyn UserReader>,
    pub refill_log: Arc<dyn RefillAlertLog>,
    pub channels: Arc<dyn NotificationChannels>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct ReminderEngine {
    parts: Collaborators,
    config: EngineConfig,
}

impl ReminderEngine {
    pub fn new(parts: Collaborators, config: EngineConfig) -> Result<Self, ReminderError> {
        config.validate()?;
        Ok(Self { parts, config })
    }

    /// Wire one store that serves every persistence seam.
    pub fn with_store<S>(
        store: Arc<S>,
        channels: Arc<dyn NotificationChannels>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, ReminderError>
    where
        S: MedicationReader + ReminderStore + UserReader + RefillAlertLog + 'static,
    {
        Self::new(
            Collaborators {
                medications: store.clone(),
                reminders: store.clone(),
                users: store.clone(),
                refill_log: store,
                channels,
                clock,
            },
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.parts.clock.now()
    }

    // ── Sweeps (also the driver's jobs) ─────────────────────

    pub fn generate_daily_reminders(&self) -> Result<GenerationSummary, ReminderError> {
        generator::generate_daily_reminders(
            self.parts.medications.as_ref(),
            self.parts.reminders.as_ref(),
            self.now(),
        )
    }

    pub fn dispatch_due_reminders(&self) -> Result<DispatchSummary, ReminderError> {
        dispatcher::dispatch_due_reminders(
            self.parts.reminders.as_ref(),
            self.parts.medications.as_ref(),
            self.parts.users.as_ref(),
            &self.parts.channels,
            &self.config,
            self.now(),
        )
    }

    pub fn sweep_missed_reminders(&self) -> Result<MissedSummary, ReminderError> {
        missed::sweep_missed_reminders(self.parts.reminders.as_ref(), &self.config, self.now())
    }

    pub fn check_refills(&self) -> Result<RefillSummary, ReminderError> {
        refill::check_refills(
            self.parts.medications.as_ref(),
            self.parts.users.as_ref(),
            self.parts.refill_log.as_ref(),
            &self.parts.channels,
            &self.config,
            self.now(),
        )
    }

    // ── Lifecycle ───────────────────────────────────────────

    pub fn get_reminder(&self, id: &Uuid) -> Result<Reminder, ReminderError> {
        lifecycle::get_reminder(self.parts.reminders.as_ref(), id)
    }

    pub fn mark_taken(
        &self,
        id: &Uuid,
        dosage: Option<DosageTaken>,
        notes: Option<String>,
    ) -> Result<Reminder, ReminderError> {
        lifecycle::mark_taken(self.parts.reminders.as_ref(), self.now(), id, dosage, notes)
    }

    pub fn mark_skipped(&self, id: &Uuid, notes: Option<String>) -> Result<Reminder, ReminderError> {
        lifecycle::mark_skipped(self.parts.reminders.as_ref(), id, notes)
    }

    /// Snooze by `minutes`, or by the configured default when `None`.
    pub fn snooze(&self, id: &Uuid, minutes: Option<u32>) -> Result<Reminder, ReminderError> {
        let minutes = minutes.unwrap_or(self.config.default_snooze_minutes);
        lifecycle::snooze(self.parts.reminders.as_ref(), self.now(), id, minutes)
    }

    // ── Queries ─────────────────────────────────────────────

    pub fn reminders_today(&self, user_id: &Uuid) -> Result<Vec<Reminder>, ReminderError> {
        stats::reminders_for_day(self.parts.reminders.as_ref(), user_id, self.now())
    }

    pub fn upcoming_reminders(&self, user_id: &Uuid) -> Result<Vec<Reminder>, ReminderError> {
        stats::upcoming_reminders(
            self.parts.reminders.as_ref(),
            user_id,
            self.now(),
            self.config.upcoming_days,
            self.config.upcoming_limit,
        )
    }

    pub fn adherence_stats(
        &self,
        user_id: &Uuid,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<AdherenceStats, ReminderError> {
        stats::adherence_stats(self.parts.reminders.as_ref(), user_id, range)
    }
}
