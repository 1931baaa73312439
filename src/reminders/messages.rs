//! Notification content for dose reminders and refill alerts.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;

use crate::models::{Medication, Reminder, User};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Something worth telling a user about, rendered per channel.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    DoseDue {
        reminder: &'a Reminder,
        medication: &'a Medication,
    },
    RefillNeeded {
        medication: &'a Medication,
        remaining: f64,
    },
}

impl Notice<'_> {
    pub fn email(&self, user: &User) -> EmailMessage {
        match self {
            Notice::DoseDue { reminder, medication } => {
                let mut body = format!(
                    "Hi {},\n\nThis is a friendly reminder to take your medication:\n\n{}\nDosage: {}\nTime: {}\n",
                    user.first_name,
                    medication.name,
                    dosage_label(medication),
                    time_label(&reminder.scheduled_time),
                );
                if let Some(instructions) = &medication.instructions {
                    body.push_str(&format!("Instructions: {instructions}\n"));
                }
                body.push_str(
                    "\nRemember to take your medication as prescribed for the best health outcomes.\n",
                );
                EmailMessage {
                    subject: format!("Medication Reminder: {}", medication.name),
                    body,
                }
            }
            Notice::RefillNeeded { medication, remaining } => EmailMessage {
                subject: format!("Refill Reminder: {}", medication.name),
                body: format!(
                    "Hi {},\n\nYou have {} of {} left. Please arrange a refill soon so you don't run out.\n",
                    user.first_name,
                    quantity_label(*remaining),
                    medication.name,
                ),
            },
        }
    }

    pub fn sms(&self) -> String {
        match self {
            Notice::DoseDue { medication, .. } => format!(
                "Medication reminder: Time to take {} ({})",
                medication.name,
                dosage_label(medication),
            ),
            Notice::RefillNeeded { medication, remaining } => format!(
                "Refill reminder: {} is running low ({} left)",
                medication.name,
                quantity_label(*remaining),
            ),
        }
    }

    pub fn push(&self) -> PushMessage {
        match self {
            Notice::DoseDue { reminder, medication } => PushMessage {
                title: "Medication Reminder".to_string(),
                body: format!("Time to take {}", medication.name),
                data: json!({
                    "reminderId": reminder.id,
                    "medicationId": medication.id,
                }),
            },
            Notice::RefillNeeded { medication, remaining } => PushMessage {
                title: "Refill Reminder".to_string(),
                body: format!(
                    "Time to refill {}: {} left",
                    medication.name,
                    quantity_label(*remaining)
                ),
                data: json!({ "medicationId": medication.id }),
            },
        }
    }
}

fn dosage_label(medication: &Medication) -> String {
    format!(
        "{} {}",
        quantity_label(medication.dosage.amount),
        medication.dosage.unit
    )
}

fn quantity_label(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount}")
    }
}

fn time_label(ts: &NaiveDateTime) -> String {
    ts.format("%H:%M").to_string()
}
