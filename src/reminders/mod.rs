//! Reminder engine. Turns medication schedules into dated reminders,
//! notifies users when a dose is due, and closes out doses nobody acted on.
//!
//! Pipeline:
//! 1. `generator` materialises today's schedule slots as `pending` reminders
//! 2. `dispatcher` notifies reminders entering the due window, once each
//! 3. `missed` marks reminders past the grace period as `missed`
//! 4. `refill` alerts owners of medications running low
//!
//! `lifecycle` holds the caller-initiated transitions (taken, skipped,
//! snoozed). `driver` runs the four sweeps on their cadences.

pub mod clock;
pub mod dispatcher;
pub mod driver;
pub mod engine;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod messages;
pub mod missed;
pub mod notifier;
pub mod refill;
pub mod stats;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{FixedClock, SystemClock};
pub use driver::{start_scheduler, Job, SchedulerHandle};
pub use engine::{Collaborators, ReminderEngine};
pub use error::{NotificationError, ReminderError};
pub use notifier::{LogNotifier, WebhookNotifier};
pub use store::SqliteStore;
pub use traits::*;
pub use types::*;
