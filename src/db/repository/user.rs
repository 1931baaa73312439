use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, first_name, email, phone, is_phone_verified,
         notify_email, notify_sms, notify_push)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id.to_string(),
            user.first_name,
            user.email,
            user.phone,
            user.is_phone_verified as i32,
            user.notification_preferences.email as i32,
            user.notification_preferences.sms as i32,
            user.notification_preferences.push as i32,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, first_name, email, phone, is_phone_verified,
             notify_email, notify_sms, notify_push
             FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, i32>(6)?,
                    row.get::<_, i32>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, first_name, email, phone, verified, email_on, sms_on, push_on)) = row else {
        return Ok(None);
    };

    Ok(Some(User {
        id: parse_uuid(&id)?,
        first_name,
        email,
        phone,
        is_phone_verified: verified != 0,
        notification_preferences: NotificationPreferences {
            email: email_on != 0,
            sms: sms_on != 0,
            push: push_on != 0,
        },
    }))
}

pub fn update_notification_preferences(
    conn: &Connection,
    user_id: &Uuid,
    prefs: &NotificationPreferences,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET notify_email = ?1, notify_sms = ?2, notify_push = ?3 WHERE id = ?4",
        params![
            prefs.email as i32,
            prefs.sms as i32,
            prefs.push as i32,
            user_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}
