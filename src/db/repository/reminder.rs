use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const REMINDER_COLUMNS: &str = "id, user_id, medication_id, scheduled_time, status,
     notification_sent, notification_sent_at, notification_channels,
     taken_at, missed_at, snooze_until, dosage_amount, dosage_unit, notes";

/// Insert a reminder. A clash on `(user, medication, scheduled_time)` is
/// reported as `ConstraintViolation`.
pub fn insert_reminder(conn: &Connection, reminder: &Reminder) -> Result<(), DatabaseError> {
    let channels = channels_to_json(&reminder.notification_channels)?;
    let result = conn.execute(
        "INSERT INTO reminders (id, user_id, medication_id, scheduled_time, status,
         notification_sent, notification_sent_at, notification_channels,
         taken_at, missed_at, snooze_until, dosage_amount, dosage_unit, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            reminder.id.to_string(),
            reminder.user_id.to_string(),
            reminder.medication_id.to_string(),
            format_timestamp(&reminder.scheduled_time),
            reminder.status.as_str(),
            reminder.notification_sent as i32,
            reminder.notification_sent_at.as_ref().map(format_timestamp),
            channels,
            reminder.taken_at.as_ref().map(format_timestamp),
            reminder.missed_at.as_ref().map(format_timestamp),
            reminder.snooze_until.as_ref().map(format_timestamp),
            reminder.dosage_taken.as_ref().map(|d| d.amount),
            reminder.dosage_taken.as_ref().map(|d| d.unit.clone()),
            reminder.notes,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(DatabaseError::ConstraintViolation(format!(
            "reminder already exists for medication {} at {}",
            reminder.medication_id,
            format_timestamp(&reminder.scheduled_time),
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_reminder(conn: &Connection, id: &Uuid) -> Result<Option<Reminder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
            params![id.to_string()],
            |row| Ok(reminder_row_from_rusqlite(row)),
        )
        .optional()?;

    row.map(|r| reminder_from_row(r?)).transpose()
}

pub fn find_reminder_by_key(
    conn: &Connection,
    user_id: &Uuid,
    medication_id: &Uuid,
    scheduled_time: &NaiveDateTime,
) -> Result<Option<Reminder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {REMINDER_COLUMNS} FROM reminders
                 WHERE user_id = ?1 AND medication_id = ?2 AND scheduled_time = ?3"
            ),
            params![
                user_id.to_string(),
                medication_id.to_string(),
                format_timestamp(scheduled_time),
            ],
            |row| Ok(reminder_row_from_rusqlite(row)),
        )
        .optional()?;

    row.map(|r| reminder_from_row(r?)).transpose()
}

/// Pending, not yet notified reminders with `from <= scheduled_time <= to`.
pub fn find_due_for_notification(
    conn: &Connection,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<Reminder>, DatabaseError> {
    query_reminders(
        conn,
        &format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending' AND notification_sent = 0
               AND scheduled_time >= ?1 AND scheduled_time <= ?2
             ORDER BY scheduled_time ASC"
        ),
        params![format_timestamp(from), format_timestamp(to)],
    )
}

/// Pending reminders with `scheduled_time < older_than`.
pub fn find_overdue(
    conn: &Connection,
    older_than: &NaiveDateTime,
) -> Result<Vec<Reminder>, DatabaseError> {
    query_reminders(
        conn,
        &format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending' AND scheduled_time < ?1
             ORDER BY scheduled_time ASC"
        ),
        params![format_timestamp(older_than)],
    )
}

/// All of a user's reminders in `[from, to]`, earliest first.
pub fn list_user_reminders_between(
    conn: &Connection,
    user_id: &Uuid,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<Reminder>, DatabaseError> {
    query_reminders(
        conn,
        &format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND scheduled_time >= ?2 AND scheduled_time <= ?3
             ORDER BY scheduled_time ASC"
        ),
        params![user_id.to_string(), format_timestamp(from), format_timestamp(to)],
    )
}

/// A user's pending reminders in `[from, to]`, earliest first, capped at `limit`.
pub fn list_user_upcoming(
    conn: &Connection,
    user_id: &Uuid,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
    limit: u32,
) -> Result<Vec<Reminder>, DatabaseError> {
    query_reminders(
        conn,
        &format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND status = 'pending'
               AND scheduled_time >= ?2 AND scheduled_time <= ?3
             ORDER BY scheduled_time ASC
             LIMIT ?4"
        ),
        params![
            user_id.to_string(),
            format_timestamp(from),
            format_timestamp(to),
            limit,
        ],
    )
}

/// Reminder counts grouped by status for one user, optionally bounded in time.
pub fn count_user_reminders_by_status(
    conn: &Connection,
    user_id: &Uuid,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Vec<(ReminderStatus, u32)>, DatabaseError> {
    let (from, to) = match range {
        Some((from, to)) => (Some(format_timestamp(&from)), Some(format_timestamp(&to))),
        None => (None, None),
    };

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM reminders
         WHERE user_id = ?1
           AND (?2 IS NULL OR scheduled_time >= ?2)
           AND (?3 IS NULL OR scheduled_time <= ?3)
         GROUP BY status
         ORDER BY status",
    )?;

    let rows = stmt.query_map(params![user_id.to_string(), from, to], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((ReminderStatus::from_str(&status)?, count));
    }
    Ok(counts)
}

/// Apply `mutation` only if the reminder is currently in `expected` status.
///
/// Returns `false` when the precondition did not hold: record missing, status
/// moved on, or for `RecordNotification` already notified or rescheduled since
/// it was read. The check and the write are one UPDATE statement, so
/// concurrent writers cannot interleave.
pub fn conditional_update_reminder(
    conn: &Connection,
    id: &Uuid,
    expected: ReminderStatus,
    mutation: &ReminderMutation,
) -> Result<bool, DatabaseError> {
    let id = id.to_string();
    let expected = expected.as_str();

    let changed = match mutation {
        ReminderMutation::MarkTaken { at, dosage, notes } => conn.execute(
            "UPDATE reminders SET status = 'taken', taken_at = ?1,
                 dosage_amount = COALESCE(?2, dosage_amount),
                 dosage_unit = COALESCE(?3, dosage_unit),
                 notes = COALESCE(?4, notes)
             WHERE id = ?5 AND status = ?6",
            params![
                format_timestamp(at),
                dosage.as_ref().map(|d| d.amount),
                dosage.as_ref().map(|d| d.unit.clone()),
                notes,
                id,
                expected,
            ],
        )?,
        ReminderMutation::MarkSkipped { notes } => conn.execute(
            "UPDATE reminders SET status = 'skipped', notes = COALESCE(?1, notes)
             WHERE id = ?2 AND status = ?3",
            params![notes, id, expected],
        )?,
        ReminderMutation::MarkMissed { at } => conn.execute(
            "UPDATE reminders SET status = 'missed', missed_at = ?1
             WHERE id = ?2 AND status = ?3",
            params![format_timestamp(at), id, expected],
        )?,
        ReminderMutation::Snooze { until } => {
            let until = format_timestamp(until);
            let result = conn.execute(
                "UPDATE reminders SET status = 'pending', scheduled_time = ?1, snooze_until = ?1,
                     notification_sent = 0, notification_sent_at = NULL,
                     notification_channels = '[]'
                 WHERE id = ?2 AND status = ?3",
                params![until, id, expected],
            );
            match result {
                Ok(n) => n,
                Err(e) if is_unique_violation(&e) => {
                    return Err(DatabaseError::ConstraintViolation(format!(
                        "another reminder for this medication is already scheduled at {until}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        ReminderMutation::RecordNotification {
            at,
            scheduled_time,
            channels,
        } => conn.execute(
            "UPDATE reminders SET notification_sent = 1, notification_sent_at = ?1,
                 notification_channels = ?2
             WHERE id = ?3 AND status = ?4 AND notification_sent = 0
               AND scheduled_time = ?5",
            params![
                format_timestamp(at),
                channels_to_json(channels)?,
                id,
                expected,
                format_timestamp(scheduled_time),
            ],
        )?,
    };

    Ok(changed == 1)
}

fn query_reminders(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Reminder>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(reminder_row_from_rusqlite(row)))?;

    let mut reminders = Vec::new();
    for row in rows {
        reminders.push(reminder_from_row(row??)?);
    }
    Ok(reminders)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn channels_to_json(channels: &BTreeSet<NotificationChannel>) -> Result<String, DatabaseError> {
    serde_json::to_string(channels)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("notification channels: {e}")))
}

struct ReminderRow {
    id: String,
    user_id: String,
    medication_id: String,
    scheduled_time: String,
    status: String,
    notification_sent: i32,
    notification_sent_at: Option<String>,
    notification_channels: String,
    taken_at: Option<String>,
    missed_at: Option<String>,
    snooze_until: Option<String>,
    dosage_amount: Option<f64>,
    dosage_unit: Option<String>,
    notes: Option<String>,
}

fn reminder_row_from_rusqlite(row: &Row<'_>) -> Result<ReminderRow, rusqlite::Error> {
    Ok(ReminderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        medication_id: row.get(2)?,
        scheduled_time: row.get(3)?,
        status: row.get(4)?,
        notification_sent: row.get(5)?,
        notification_sent_at: row.get(6)?,
        notification_channels: row.get(7)?,
        taken_at: row.get(8)?,
        missed_at: row.get(9)?,
        snooze_until: row.get(10)?,
        dosage_amount: row.get(11)?,
        dosage_unit: row.get(12)?,
        notes: row.get(13)?,
    })
}

fn reminder_from_row(row: ReminderRow) -> Result<Reminder, DatabaseError> {
    let notification_channels: BTreeSet<NotificationChannel> =
        serde_json::from_str(&row.notification_channels).map_err(|e| {
            DatabaseError::ConstraintViolation(format!("invalid notification channels: {e}"))
        })?;

    let dosage_taken = match (row.dosage_amount, row.dosage_unit) {
        (Some(amount), Some(unit)) => Some(DosageTaken { amount, unit }),
        _ => None,
    };

    Ok(Reminder {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        medication_id: parse_uuid(&row.medication_id)?,
        scheduled_time: parse_timestamp("scheduled_time", &row.scheduled_time)?,
        status: ReminderStatus::from_str(&row.status)?,
        notification_sent: row.notification_sent != 0,
        notification_sent_at: parse_optional_timestamp(
            "notification_sent_at",
            row.notification_sent_at,
        )?,
        notification_channels,
        taken_at: parse_optional_timestamp("taken_at", row.taken_at)?,
        missed_at: parse_optional_timestamp("missed_at", row.missed_at)?,
        snooze_until: parse_optional_timestamp("snooze_until", row.snooze_until)?,
        dosage_taken,
        notes: row.notes,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::repository::{insert_medication, insert_user};
    use crate::db::sqlite::open_memory_database;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn seed(conn: &Connection) -> (Uuid, Uuid) {
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Sam".into(),
            email: "sam@example.com".into(),
            phone: None,
            is_phone_verified: false,
            notification_preferences: NotificationPreferences::default(),
        };
        insert_user(conn, &user).unwrap();
        let med = Medication {
            id: Uuid::new_v4(),
            user_id: user.id,
            name: "Aspirin".into(),
            dosage: Dosage { amount: 81.0, unit: "mg".into() },
            instructions: None,
            schedule: vec![ScheduleEntry::daily("09:00")],
            start_date: None,
            end_date: None,
            refill_reminder: None,
            is_active: true,
        };
        insert_medication(conn, &med).unwrap();
        (user.id, med.id)
    }

    #[test]
    fn insert_and_find_by_key() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let reminder = Reminder::pending(user_id, med_id, at(9, 0));
        insert_reminder(&conn, &reminder).unwrap();

        let found = find_reminder_by_key(&conn, &user_id, &med_id, &at(9, 0)).unwrap().unwrap();
        assert_eq!(found, reminder);
        assert!(find_reminder_by_key(&conn, &user_id, &med_id, &at(9, 1)).unwrap().is_none());
    }

    #[test]
    fn duplicate_slot_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        insert_reminder(&conn, &Reminder::pending(user_id, med_id, at(9, 0))).unwrap();

        let err = insert_reminder(&conn, &Reminder::pending(user_id, med_id, at(9, 0))).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn due_window_is_inclusive_and_skips_notified() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let early = Reminder::pending(user_id, med_id, at(8, 59));
        let start = Reminder::pending(user_id, med_id, at(9, 0));
        let end = Reminder::pending(user_id, med_id, at(9, 5));
        let late = Reminder::pending(user_id, med_id, at(9, 6));
        let mut notified = Reminder::pending(user_id, med_id, at(9, 3));
        notified.notification_sent = true;
        for r in [&early, &start, &end, &late, &notified] {
            insert_reminder(&conn, r).unwrap();
        }

        let due = find_due_for_notification(&conn, &at(9, 0), &at(9, 5)).unwrap();
        let ids: Vec<Uuid> = due.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![start.id, end.id]);
    }

    #[test]
    fn overdue_is_strictly_older() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let old = Reminder::pending(user_id, med_id, at(8, 0));
        let boundary = Reminder::pending(user_id, med_id, at(8, 30));
        insert_reminder(&conn, &old).unwrap();
        insert_reminder(&conn, &boundary).unwrap();

        let overdue = find_overdue(&conn, &at(8, 30)).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, old.id);
    }

    #[test]
    fn conditional_update_applies_once() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let reminder = Reminder::pending(user_id, med_id, at(9, 0));
        insert_reminder(&conn, &reminder).unwrap();

        let taken = ReminderMutation::MarkTaken {
            at: at(9, 2),
            dosage: Some(DosageTaken { amount: 81.0, unit: "mg".into() }),
            notes: Some("with breakfast".into()),
        };
        assert!(conditional_update_reminder(&conn, &reminder.id, ReminderStatus::Pending, &taken).unwrap());

        let missed = ReminderMutation::MarkMissed { at: at(9, 40) };
        assert!(!conditional_update_reminder(&conn, &reminder.id, ReminderStatus::Pending, &missed).unwrap());

        let stored = get_reminder(&conn, &reminder.id).unwrap().unwrap();
        assert_eq!(stored.status, ReminderStatus::Taken);
        assert_eq!(stored.taken_at, Some(at(9, 2)));
        assert!(stored.missed_at.is_none());
        assert_eq!(stored.dosage_taken.unwrap().unit, "mg");
        assert_eq!(stored.notes.as_deref(), Some("with breakfast"));
    }

    #[test]
    fn record_notification_only_once() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let reminder = Reminder::pending(user_id, med_id, at(9, 0));
        insert_reminder(&conn, &reminder).unwrap();

        let record = ReminderMutation::RecordNotification {
            at: at(8, 56),
            scheduled_time: at(9, 0),
            channels: [NotificationChannel::Email, NotificationChannel::Push].into_iter().collect(),
        };
        assert!(conditional_update_reminder(&conn, &reminder.id, ReminderStatus::Pending, &record).unwrap());
        assert!(!conditional_update_reminder(&conn, &reminder.id, ReminderStatus::Pending, &record).unwrap());

        let stored = get_reminder(&conn, &reminder.id).unwrap().unwrap();
        assert!(stored.notification_sent);
        assert_eq!(stored.notification_sent_at, Some(at(8, 56)));
        assert_eq!(stored.notification_channels.len(), 2);
    }

    #[test]
    fn record_notification_requires_the_slot_that_was_read() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let reminder = Reminder::pending(user_id, med_id, at(9, 0));
        insert_reminder(&conn, &reminder).unwrap();
        conditional_update_reminder(
            &conn,
            &reminder.id,
            ReminderStatus::Pending,
            &ReminderMutation::Snooze { until: at(9, 15) },
        )
        .unwrap();

        let stale = ReminderMutation::RecordNotification {
            at: at(8, 56),
            scheduled_time: at(9, 0),
            channels: [NotificationChannel::Email].into_iter().collect(),
        };
        assert!(!conditional_update_reminder(&conn, &reminder.id, ReminderStatus::Pending, &stale).unwrap());

        let stored = get_reminder(&conn, &reminder.id).unwrap().unwrap();
        assert!(!stored.notification_sent);
        assert_eq!(stored.scheduled_time, at(9, 15));
    }

    #[test]
    fn snooze_into_occupied_slot_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let first = Reminder::pending(user_id, med_id, at(9, 0));
        let second = Reminder::pending(user_id, med_id, at(9, 15));
        insert_reminder(&conn, &first).unwrap();
        insert_reminder(&conn, &second).unwrap();

        let err = conditional_update_reminder(
            &conn,
            &first.id,
            ReminderStatus::Pending,
            &ReminderMutation::Snooze { until: at(9, 15) },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn unknown_id_fails_precondition() {
        let conn = open_memory_database().unwrap();
        let applied = conditional_update_reminder(
            &conn,
            &Uuid::new_v4(),
            ReminderStatus::Pending,
            &ReminderMutation::MarkSkipped { notes: None },
        )
        .unwrap();
        assert!(!applied);
    }

    #[test]
    fn status_counts_respect_range() {
        let conn = open_memory_database().unwrap();
        let (user_id, med_id) = seed(&conn);
        let a = Reminder::pending(user_id, med_id, at(7, 0));
        let b = Reminder::pending(user_id, med_id, at(9, 0));
        let c = Reminder::pending(user_id, med_id, at(21, 0));
        for r in [&a, &b, &c] {
            insert_reminder(&conn, r).unwrap();
        }
        conditional_update_reminder(
            &conn,
            &a.id,
            ReminderStatus::Pending,
            &ReminderMutation::MarkTaken { at: at(7, 1), dosage: None, notes: None },
        )
        .unwrap();

        let all = count_user_reminders_by_status(&conn, &user_id, None).unwrap();
        assert_eq!(all, vec![(ReminderStatus::Pending, 2), (ReminderStatus::Taken, 1)]);

        let morning = count_user_reminders_by_status(&conn, &user_id, Some((at(8, 0), at(12, 0)))).unwrap();
        assert_eq!(morning, vec![(ReminderStatus::Pending, 1)]);
    }
}
