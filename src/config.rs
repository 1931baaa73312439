use std::path::PathBuf;
use std::time::Duration;

use crate::reminders::ReminderError;

/// Application-level constants
pub const APP_NAME: &str = "MedRoutine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/MedRoutine/ on all platforms; falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// SQLite database file. `MEDROUTINE_DB_PATH` overrides the default.
pub fn database_path() -> PathBuf {
    match std::env::var("MEDROUTINE_DB_PATH") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => app_data_dir().join("medroutine.db"),
    }
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,medroutine=debug"
}

/// Endpoints for the HTTP notification transport.
///
/// A channel without a URL is reported as unreachable on every send.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub email_url: Option<String>,
    pub sms_url: Option<String>,
    pub push_url: Option<String>,
    pub email_from: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            email_url: None,
            sms_url: None,
            push_url: None,
            email_from: "reminders@medroutine.local".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ReminderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ReminderError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self {
            email_url: non_empty("MEDROUTINE_EMAIL_WEBHOOK_URL"),
            sms_url: non_empty("MEDROUTINE_SMS_WEBHOOK_URL"),
            push_url: non_empty("MEDROUTINE_PUSH_WEBHOOK_URL"),
            auth_token: non_empty("MEDROUTINE_WEBHOOK_TOKEN"),
            ..Self::default()
        };
        if let Some(from) = non_empty("MEDROUTINE_EMAIL_FROM") {
            config.email_from = from;
        }
        if let Some(secs) = non_empty("MEDROUTINE_WEBHOOK_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ReminderError::Config(format!(
                    "MEDROUTINE_WEBHOOK_TIMEOUT_SECS: expected a number, got {secs:?}"
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// True when at least one channel has an endpoint.
    pub fn is_configured(&self) -> bool {
        self.email_url.is_some() || self.sms_url.is_some() || self.push_url.is_some()
    }
}
