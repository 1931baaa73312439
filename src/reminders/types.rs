//! Engine configuration and per-run summaries.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;

use super::error::ReminderError;
use crate::models::enums::ReminderStatus;

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Upper bound for the dispatch window and the grace period.
const MAX_OFFSET: chrono::Duration = chrono::Duration::days(7);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Look-ahead for notification: reminders due within `[now, now + window]`.
    pub dispatch_window: chrono::Duration,
    /// How long a pending reminder may sit past its time before it is missed.
    pub grace_period: chrono::Duration,
    /// Tick of the due-reminder dispatcher.
    pub dispatch_interval: Duration,
    /// Tick of the missed-reminder sweeper.
    pub missed_sweep_interval: Duration,
    /// Local time of day the daily generator runs.
    pub generation_time: NaiveTime,
    /// Local time of day the refill check runs.
    pub refill_check_time: NaiveTime,
    /// Upper bound on a single channel send.
    pub send_timeout: Duration,
    /// SQLite busy timeout for store operations.
    pub store_busy_timeout: Duration,
    /// Also run the generator once when the scheduler starts.
    pub generate_on_startup: bool,
    /// At most one refill alert per medication per day.
    pub refill_alert_once_per_day: bool,
    /// Snooze length when the caller gives none.
    pub default_snooze_minutes: u32,
    /// Look-ahead and cap for the upcoming-reminders query.
    pub upcoming_days: i64,
    pub upcoming_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_window: chrono::Duration::minutes(5),
            grace_period: chrono::Duration::minutes(30),
            dispatch_interval: Duration::from_secs(60),
            missed_sweep_interval: Duration::from_secs(5 * 60),
            generation_time: NaiveTime::MIN,
            refill_check_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            send_timeout: Duration::from_secs(10),
            store_busy_timeout: Duration::from_secs(5),
            generate_on_startup: true,
            refill_alert_once_per_day: true,
            default_snooze_minutes: 15,
            upcoming_days: 7,
            upcoming_limit: 20,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `MEDROUTINE_*` environment variables.
    pub fn from_env() -> Result<Self, ReminderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ReminderError> {
        let mut config = Self::default();

        if let Some(v) = lookup("MEDROUTINE_DISPATCH_WINDOW_MINUTES") {
            config.dispatch_window = parse_minutes("MEDROUTINE_DISPATCH_WINDOW_MINUTES", &v)?;
        }
        if let Some(v) = lookup("MEDROUTINE_GRACE_PERIOD_MINUTES") {
            config.grace_period = parse_minutes("MEDROUTINE_GRACE_PERIOD_MINUTES", &v)?;
        }
        if let Some(v) = lookup("MEDROUTINE_DISPATCH_INTERVAL_SECS") {
            config.dispatch_interval =
                Duration::from_secs(parse_number("MEDROUTINE_DISPATCH_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("MEDROUTINE_MISSED_SWEEP_INTERVAL_SECS") {
            config.missed_sweep_interval =
                Duration::from_secs(parse_number("MEDROUTINE_MISSED_SWEEP_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("MEDROUTINE_GENERATION_TIME") {
            config.generation_time = parse_time_of_day("MEDROUTINE_GENERATION_TIME", &v)?;
        }
        if let Some(v) = lookup("MEDROUTINE_REFILL_CHECK_TIME") {
            config.refill_check_time = parse_time_of_day("MEDROUTINE_REFILL_CHECK_TIME", &v)?;
        }
        if let Some(v) = lookup("MEDROUTINE_SEND_TIMEOUT_SECS") {
            config.send_timeout =
                Duration::from_secs(parse_number("MEDROUTINE_SEND_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("MEDROUTINE_STORE_BUSY_TIMEOUT_SECS") {
            config.store_busy_timeout =
                Duration::from_secs(parse_number("MEDROUTINE_STORE_BUSY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("MEDROUTINE_GENERATE_ON_STARTUP") {
            config.generate_on_startup = parse_flag("MEDROUTINE_GENERATE_ON_STARTUP", &v)?;
        }
        if let Some(v) = lookup("MEDROUTINE_REFILL_ALERT_ONCE_PER_DAY") {
            config.refill_alert_once_per_day =
                parse_flag("MEDROUTINE_REFILL_ALERT_ONCE_PER_DAY", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReminderError> {
        if self.dispatch_window < chrono::Duration::zero() || self.dispatch_window > MAX_OFFSET {
            return Err(ReminderError::Config(
                "dispatch window must be between 0 and 7 days".into(),
            ));
        }
        if self.grace_period < chrono::Duration::zero() || self.grace_period > MAX_OFFSET {
            return Err(ReminderError::Config("grace period must be between 0 and 7 days".into()));
        }
        if self.dispatch_interval.is_zero() || self.missed_sweep_interval.is_zero() {
            return Err(ReminderError::Config("sweep intervals must be positive".into()));
        }
        if self.send_timeout.is_zero() {
            return Err(ReminderError::Config("send timeout must be positive".into()));
        }
        Ok(())
    }
}

fn parse_minutes(key: &str, value: &str) -> Result<chrono::Duration, ReminderError> {
    chrono::Duration::try_minutes(parse_number(key, value)?)
        .ok_or_else(|| ReminderError::Config(format!("{key}: {value:?} minutes is out of range")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ReminderError> {
    value
        .trim()
        .parse()
        .map_err(|_| ReminderError::Config(format!("{key}: expected a number, got {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ReminderError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReminderError::Config(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

fn parse_time_of_day(key: &str, value: &str) -> Result<NaiveTime, ReminderError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ReminderError::Config(format!("{key}: expected HH:MM, got {value:?}")))
}

// ═══════════════════════════════════════════
// Run summaries
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub medications: usize,
    pub created: usize,
    pub already_present: usize,
    pub in_the_past: usize,
    pub invalid_entries: usize,
    pub failed_medications: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub due: usize,
    pub notified: usize,
    /// Records that changed under us between read and write.
    pub skipped: usize,
    /// Records abandoned this tick (missing user/medication, store error).
    pub failed: usize,
    pub failed_sends: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissedSummary {
    pub overdue: usize,
    pub marked_missed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefillSummary {
    pub tracked: usize,
    pub alerted: usize,
    pub suppressed: usize,
    pub failed: usize,
}

/// Reminder counts by status plus the share that were taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdherenceStats {
    pub by_status: BTreeMap<ReminderStatus, u32>,
    pub total: u32,
    pub taken: u32,
    /// Percentage, two decimals. Zero when there are no reminders.
    pub adherence_rate: f64,
}
