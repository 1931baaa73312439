//! Error types for the reminder engine.
//!
//! Separate from `DatabaseError` so collaborators other than SQLite can
//! plug into the engine traits.

use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::ReminderStatus;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Reminder already exists for medication {medication_id} at {scheduled_time}")]
    DuplicateSlot {
        medication_id: Uuid,
        scheduled_time: NaiveDateTime,
    },

    #[error("Invalid schedule entry {time:?} for medication {medication_id}: {reason}")]
    Schedule {
        medication_id: Uuid,
        time: String,
        reason: String,
    },

    #[error("Cannot move reminder from {from} to {to}")]
    InvalidTransition {
        from: ReminderStatus,
        to: ReminderStatus,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: Uuid },

    #[error("Notification failed: {0}")]
    Notification(#[from] NotificationError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler runtime error: {0}")]
    Runtime(String),
}

/// Failure of a single channel send. Logged by the engine, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("recipient unreachable: {0}")]
    Unreachable(String),
}
