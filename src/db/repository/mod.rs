//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table; all public functions are re-exported here.

mod medication;
mod refill_alert;
mod reminder;
mod user;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::{DatabaseError, TIMESTAMP_FORMAT};

pub use medication::*;
pub use refill_alert::*;
pub use reminder::*;
pub use user::*;

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid {field} {value:?}: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    value.map(|v| parse_timestamp(field, &v)).transpose()
}

pub(crate) fn parse_optional_date(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, DatabaseError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|e| {
                DatabaseError::ConstraintViolation(format!("invalid {field} {v:?}: {e}"))
            })
        })
        .transpose()
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
