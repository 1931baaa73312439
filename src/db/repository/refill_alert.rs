use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::format_timestamp;
use crate::db::DatabaseError;

/// Record that a refill alert went out for `medication_id` on `date`.
///
/// Returns `false` if one was already recorded for that day.
pub fn record_refill_alert(
    conn: &Connection,
    medication_id: &Uuid,
    date: NaiveDate,
    alerted_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO refill_alerts (medication_id, alert_date, alerted_at)
         VALUES (?1, ?2, ?3)",
        params![
            medication_id.to_string(),
            date.to_string(),
            format_timestamp(alerted_at),
        ],
    )?;
    Ok(inserted == 1)
}

pub fn has_refill_alert(
    conn: &Connection,
    medication_id: &Uuid,
    date: NaiveDate,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM refill_alerts WHERE medication_id = ?1 AND alert_date = ?2",
        params![medication_id.to_string(), date.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
