//! Alert dispatch for high-value sightings.
//!
//! The pipeline talks to a [`Notifier`] trait so the transport can be
//! stubbed in tests and swapped for a real one in deployment. Dispatch
//! is best-effort: one attempt per sighting, failures logged at the
//! call site and swallowed, never propagated into the parse/persist
//! path.

use std::process::{Command, Stdio};

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Dispatch failure. Recovered locally by the pipeline; never fatal.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Alert sink for high-value sightings.
pub trait Notifier: Send + Sync {
    /// Dispatch a single-line alert for one sighting.
    ///
    /// Must not block beyond its own dispatch attempt.
    fn notify(
        &self,
        species_name: &str,
        species_id: u16,
        latitude: f64,
        longitude: f64,
        disappear_time: i64,
    ) -> Result<(), NotifyError>;
}

/// Render the single-line alert message.
pub fn alert_line(
    species_name: &str,
    species_id: u16,
    latitude: f64,
    longitude: f64,
    disappear_time: i64,
) -> String {
    let expiry = DateTime::from_timestamp_millis(disappear_time)
        .map_or_else(|| disappear_time.to_string(), |dt| {
            dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        });
    format!("{species_name} Id: {species_id} @ {latitude},{longitude} till {expiry}")
}

/// Notifier that discards every alert. Used when notifications are
/// disabled and as the default in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _: &str, _: u16, _: f64, _: f64, _: i64) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Notifier backed by the system `mail` binary.
///
/// The child process is spawned and never waited on from the calling
/// thread, so dispatch cannot stall the pipeline; a detached thread
/// reaps the child.
#[derive(Debug, Clone)]
pub struct MailCommandNotifier {
    recipient: String,
}

impl MailCommandNotifier {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }
}

impl Notifier for MailCommandNotifier {
    fn notify(
        &self,
        species_name: &str,
        species_id: u16,
        latitude: f64,
        longitude: f64,
        disappear_time: i64,
    ) -> Result<(), NotifyError> {
        let subject = alert_line(species_name, species_id, latitude, longitude, disappear_time);
        info!(recipient = %self.recipient, "dispatching mail alert: {subject}");

        let child = Command::new("mail")
            .arg("-s")
            .arg(&subject)
            .arg(&self.recipient)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| NotifyError(format!("failed to spawn mail command: {e}")))?;

        std::thread::spawn(move || {
            let mut child = child;
            let _ = child.wait();
        });

        Ok(())
    }
}

/// Notification configuration.
///
/// ```toml
/// [notify]
/// enabled = true
/// recipient = "ops@example.com"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Enable alert dispatch.
    pub enabled: bool,
    /// Recipient address for the mail transport.
    pub recipient: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient: String::new(),
        }
    }
}

impl NotifyConfig {
    /// Validate the notification configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.recipient.trim().is_empty() {
            return Err("notify.recipient must not be empty".to_string());
        }
        if !looks_like_email(&self.recipient) {
            return Err("notify.recipient must be a valid email address".to_string());
        }
        Ok(())
    }

    /// Build the notifier this configuration describes.
    pub fn build(&self) -> Box<dyn Notifier> {
        if self.enabled {
            Box::new(MailCommandNotifier::new(self.recipient.clone()))
        } else {
            Box::new(NoopNotifier)
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    let trimmed = value.trim();
    let mut parts = trimmed.split('@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    parts.next().is_none() && !local.is_empty() && !domain.is_empty() && domain.contains('.')
}
