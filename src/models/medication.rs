use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DayOfWeek;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dosage {
    pub amount: f64,
    pub unit: String,
}

/// A medication owned by a user. Read-only to the reminder engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub dosage: Dosage,
    pub instructions: Option<String>,
    pub schedule: Vec<ScheduleEntry>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub refill_reminder: Option<RefillReminder>,
    pub is_active: bool,
}

impl Medication {
    /// Whether `date` falls inside the optional start/end window.
    pub fn covers(&self, date: NaiveDate) -> bool {
        let started = self.start_date.map_or(true, |start| start <= date);
        let not_ended = self.end_date.map_or(true, |end| end >= date);
        started && not_ended
    }

    pub fn needs_refill(&self) -> bool {
        self.refill_reminder
            .as_ref()
            .is_some_and(|r| r.enabled && r.remaining_quantity <= r.threshold_quantity)
    }
}

/// One recurrence rule: a 24-hour "HH:MM" time on a set of weekdays.
///
/// The time is kept as the raw string so a malformed entry can still be
/// loaded and reported by the generator instead of failing the whole
/// medication at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: String,
    #[serde(default)]
    pub days: Vec<DayOfWeek>,
}

impl ScheduleEntry {
    pub fn new(time: &str, days: Vec<DayOfWeek>) -> Self {
        Self {
            time: time.to_string(),
            days,
        }
    }

    /// Every day of the week at `time`.
    pub fn daily(time: &str) -> Self {
        Self::new(time, Vec::new())
    }

    /// Parse the time of day. Accepts `H:MM` and `HH:MM`.
    pub fn parse_time(&self) -> Result<NaiveTime, String> {
        let (hours, minutes) = self
            .time
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {:?}", self.time))?;

        if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
            return Err(format!("expected HH:MM, got {:?}", self.time));
        }

        let h: u32 = hours
            .parse()
            .map_err(|_| format!("invalid hour in {:?}", self.time))?;
        let m: u32 = minutes
            .parse()
            .map_err(|_| format!("invalid minute in {:?}", self.time))?;

        NaiveTime::from_hms_opt(h, m, 0).ok_or_else(|| format!("out of range time {:?}", self.time))
    }

    /// Empty day lists mean every day.
    pub fn applies_on(&self, day: DayOfWeek) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefillReminder {
    pub enabled: bool,
    pub threshold_quantity: f64,
    pub remaining_quantity: f64,
}
