//! Notification transports and bounded, per-channel delivery.
//!
//! Every channel send runs on its own short-lived thread and is abandoned
//! after the configured timeout, so a stuck transport can delay a sweep by
//! at most one timeout per attempted channel.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::error::NotificationError;
use super::messages::{EmailMessage, Notice, PushMessage};
use super::traits::NotificationChannels;
use crate::config::WebhookConfig;
use crate::models::enums::NotificationChannel;
use crate::models::User;

// ═══════════════════════════════════════════
// Channel eligibility
// ═══════════════════════════════════════════

/// Channels to attempt for `user`: enabled in preferences and, for SMS,
/// backed by a verified phone number.
pub fn eligible_channels(user: &User) -> BTreeSet<NotificationChannel> {
    let prefs = &user.notification_preferences;
    let mut channels = BTreeSet::new();
    if prefs.email {
        channels.insert(NotificationChannel::Email);
    }
    if prefs.sms && user.sms_reachable().is_some() {
        channels.insert(NotificationChannel::Sms);
    }
    if prefs.push {
        channels.insert(NotificationChannel::Push);
    }
    channels
}

/// Outcome of delivering one notice to one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    /// Every channel a send was attempted on, successful or not.
    pub attempted: BTreeSet<NotificationChannel>,
    pub failed: Vec<(NotificationChannel, NotificationError)>,
}

/// Attempt `notice` on each eligible channel. Failures are logged and
/// reported; they never stop the remaining channels.
pub fn deliver(
    channels: &Arc<dyn NotificationChannels>,
    timeout: Duration,
    user: &User,
    notice: Notice<'_>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for channel in eligible_channels(user) {
        let result = match channel {
            NotificationChannel::Email => {
                let to = user.email.clone();
                let message = notice.email(user);
                send_with_timeout(channels, timeout, move |c| c.send_email(&to, &message))
            }
            NotificationChannel::Sms => {
                let phone = user.sms_reachable().unwrap_or_default().to_string();
                let text = notice.sms();
                send_with_timeout(channels, timeout, move |c| c.send_sms(&phone, &text))
            }
            NotificationChannel::Push => {
                let user_id = user.id;
                let message = notice.push();
                send_with_timeout(channels, timeout, move |c| c.send_push(&user_id, &message))
            }
        };

        report.attempted.insert(channel);
        if let Err(e) = result {
            tracing::warn!(
                user_id = %user.id,
                channel = channel.as_str(),
                error = %e,
                "Notification send failed"
            );
            report.failed.push((channel, e));
        }
    }

    report
}

/// Run one send on a worker thread and wait at most `timeout` for it.
///
/// A send that overruns keeps running detached; its late result is dropped.
pub fn send_with_timeout<F>(
    channels: &Arc<dyn NotificationChannels>,
    timeout: Duration,
    send: F,
) -> Result<(), NotificationError>
where
    F: FnOnce(&dyn NotificationChannels) -> Result<(), NotificationError> + Send + 'static,
{
    let channels = Arc::clone(channels);
    let (tx, rx) = mpsc::channel();

    std::thread::Builder::new()
        .name("medroutine-send".into())
        .spawn(move || {
            let _ = tx.send(send(channels.as_ref()));
        })
        .map_err(|e| NotificationError::Transport(format!("cannot spawn sender: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(NotificationError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(NotificationError::Transport("sender exited without a result".into()))
        }
    }
}

// ═══════════════════════════════════════════
// Transports
// ═══════════════════════════════════════════

/// Writes every notification to the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationChannels for LogNotifier {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError> {
        tracing::info!(to, subject = %message.subject, "Email notification");
        Ok(())
    }

    fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError> {
        tracing::info!(phone, text, "SMS notification");
        Ok(())
    }

    fn send_push(&self, user_id: &Uuid, message: &PushMessage) -> Result<(), NotificationError> {
        tracing::info!(user_id = %user_id, title = %message.title, "Push notification");
        Ok(())
    }
}

/// Posts each notification as JSON to a per-channel HTTP endpoint
/// (mail relay, SMS gateway, push service).
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Build the HTTP client. Must be called outside an async context.
    pub fn new(config: WebhookConfig) -> Result<Self, NotificationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn post(
        &self,
        channel: NotificationChannel,
        url: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        let url = url.ok_or_else(|| {
            NotificationError::Unreachable(format!("no {} endpoint configured", channel.as_str()))
        })?;

        let mut request = self.client.post(url).json(&payload);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                NotificationError::Timeout(self.config.request_timeout)
            } else {
                NotificationError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(format!(
                "{} endpoint returned {status}",
                channel.as_str()
            )));
        }
        tracing::debug!(channel = channel.as_str(), "Webhook notification accepted");
        Ok(())
    }
}

impl NotificationChannels for WebhookNotifier {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError> {
        self.post(
            NotificationChannel::Email,
            self.config.email_url.as_deref(),
            json!({
                "from": self.config.email_from,
                "to": to,
                "subject": message.subject,
                "body": message.body,
            }),
        )
    }

    fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError> {
        self.post(
            NotificationChannel::Sms,
            self.config.sms_url.as_deref(),
            json!({ "to": phone, "message": text }),
        )
    }

    fn send_push(&self, user_id: &Uuid, message: &PushMessage) -> Result<(), NotificationError> {
        self.post(
            NotificationChannel::Push,
            self.config.push_url.as_deref(),
            json!({
                "userId": user_id,
                "title": message.title,
                "body": message.body,
                "data": message.data,
            }),
        )
    }
}
