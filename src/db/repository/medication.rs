use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_optional_date, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const MEDICATION_COLUMNS: &str = "id, user_id, name, dosage_amount, dosage_unit, instructions,
     schedule_json, start_date, end_date, refill_json, is_active";

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    let schedule_json = serde_json::to_string(&med.schedule)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("schedule: {e}")))?;
    let refill_json = med
        .refill_reminder
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(format!("refill reminder: {e}")))?;

    conn.execute(
        "INSERT INTO medications (id, user_id, name, dosage_amount, dosage_unit, instructions,
         schedule_json, start_date, end_date, refill_json, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            med.id.to_string(),
            med.user_id.to_string(),
            med.name,
            med.dosage.amount,
            med.dosage.unit,
            med.instructions,
            schedule_json,
            med.start_date.map(|d| d.to_string()),
            med.end_date.map(|d| d.to_string()),
            refill_json,
            med.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_medication(conn: &Connection, id: &Uuid) -> Result<Option<Medication>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
            params![id.to_string()],
            |row| Ok(medication_row_from_rusqlite(row)),
        )
        .optional()?;

    row.map(|r| medication_from_row(r?)).transpose()
}

pub fn get_active_medications(conn: &Connection) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications WHERE is_active = 1 ORDER BY name"
    ))?;

    let rows = stmt.query_map([], |row| Ok(medication_row_from_rusqlite(row)))?;
    collect_readable(rows)
}

/// Active medications whose refill tracking is switched on.
pub fn get_refill_tracked_medications(conn: &Connection) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications
         WHERE is_active = 1
           AND refill_json IS NOT NULL
           AND json_extract(refill_json, '$.enabled') = 1
         ORDER BY name"
    ))?;

    let rows = stmt.query_map([], |row| Ok(medication_row_from_rusqlite(row)))?;
    collect_readable(rows)
}

/// Decode each row on its own. A row whose stored JSON no longer parses is
/// logged and left out so the rest of the list is still usable.
fn collect_readable(
    rows: impl Iterator<Item = rusqlite::Result<rusqlite::Result<MedicationRow>>>,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut meds = Vec::new();
    for row in rows {
        let row = row??;
        let id = row.id.clone();
        match medication_from_row(row) {
            Ok(med) => meds.push(med),
            Err(e) => tracing::warn!(
                medication_id = %id,
                error = %e,
                "Skipping unreadable medication row"
            ),
        }
    }
    Ok(meds)
}

struct MedicationRow {
    id: String,
    user_id: String,
    name: String,
    dosage_amount: f64,
    dosage_unit: String,
    instructions: Option<String>,
    schedule_json: String,
    start_date: Option<String>,
    end_date: Option<String>,
    refill_json: Option<String>,
    is_active: i32,
}

fn medication_row_from_rusqlite(row: &Row<'_>) -> Result<MedicationRow, rusqlite::Error> {
    Ok(MedicationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        dosage_amount: row.get(3)?,
        dosage_unit: row.get(4)?,
        instructions: row.get(5)?,
        schedule_json: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        refill_json: row.get(9)?,
        is_active: row.get(10)?,
    })
}

fn medication_from_row(row: MedicationRow) -> Result<Medication, DatabaseError> {
    let schedule: Vec<ScheduleEntry> = serde_json::from_str(&row.schedule_json).map_err(|e| {
        DatabaseError::ConstraintViolation(format!("invalid schedule for {}: {e}", row.id))
    })?;
    let refill_reminder = row
        .refill_json
        .as_deref()
        .map(serde_json::from_str::<RefillReminder>)
        .transpose()
        .map_err(|e| {
            DatabaseError::ConstraintViolation(format!("invalid refill reminder for {}: {e}", row.id))
        })?;

    Ok(Medication {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        name: row.name,
        dosage: Dosage {
            amount: row.dosage_amount,
            unit: row.dosage_unit,
        },
        instructions: row.instructions,
        schedule,
        start_date: parse_optional_date("start_date", row.start_date)?,
        end_date: parse_optional_date("end_date", row.end_date)?,
        refill_reminder,
        is_active: row.is_active != 0,
    })
}
