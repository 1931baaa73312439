use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: true,
            push: true,
        }
    }
}

/// The slice of a user account the reminder engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_phone_verified: bool,
    pub notification_preferences: NotificationPreferences,
}

impl User {
    /// SMS needs both a phone number on file and a verified one.
    pub fn sms_reachable(&self) -> Option<&str> {
        match self.phone.as_deref() {
            Some(phone) if self.is_phone_verified && !phone.trim().is_empty() => Some(phone),
            _ => None,
        }
    }
}
