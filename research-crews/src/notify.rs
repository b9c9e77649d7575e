//! Pushover push notifications.
//!
//! Long bodies are split with [`chunk::split_message`] and sent as numbered
//! parts. Each part succeeds or fails on its own; only missing credentials
//! abort a send.

use serde_json::{Value, json};

use crate::chunk;
use crate::config::{PUSHOVER_URL, Secrets};
use crate::error::{Error, Result};

/// Pushover's per-message character cap.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Outcome of posting one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOutcome {
    Ok,
    Failed(String),
}

/// Ordered per-part outcomes of one `send`.
#[derive(Debug, Clone)]
pub struct NotificationReport {
    pub parts: Vec<PartOutcome>,
}

impl NotificationReport {
    pub fn all_ok(&self) -> bool {
        self.parts.iter().all(|p| *p == PartOutcome::Ok)
    }

    /// Human-readable line per part, 1-based.
    pub fn results(&self) -> Vec<String> {
        self.parts
            .iter()
            .enumerate()
            .map(|(i, outcome)| match outcome {
                PartOutcome::Ok => format!("Part {}: OK", i + 1),
                PartOutcome::Failed(e) => format!("Part {}: Error - {e}", i + 1),
            })
            .collect()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": "sent",
            "notification": "sent",
            "results": self.results(),
        })
    }
}

/// Title for part `index` (0-based) of `total`.
pub fn part_title(title: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{title} (Part {}/{total})", index + 1)
    } else {
        title.to_string()
    }
}

/// Pushover client.
pub struct Notifier {
    secrets: Secrets,
    endpoint: String,
    http: reqwest::Client,
}

impl Notifier {
    pub fn new(secrets: &Secrets) -> Self {
        Self {
            secrets: secrets.clone(),
            endpoint: PUSHOVER_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point at a different endpoint (local relay, test server).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Send `body` under `title`, splitting into parts as needed.
    pub async fn send(&self, title: &str, body: &str) -> Result<NotificationReport> {
        let creds = self.secrets.pushover()?;

        let messages = chunk::split_message(body, MAX_MESSAGE_LEN);
        let total = messages.len();
        let mut parts = Vec::with_capacity(total);

        for (i, message) in messages.iter().enumerate() {
            let title = part_title(title, i, total);
            let form = [
                ("user", creds.user.as_str()),
                ("token", creds.token.as_str()),
                ("title", title.as_str()),
                ("message", message.as_str()),
            ];
            match self.post(&form).await {
                Ok(()) => {
                    tracing::info!(part = i + 1, total, "Notification part sent");
                    parts.push(PartOutcome::Ok);
                }
                Err(e) => {
                    tracing::warn!(part = i + 1, total, error = %e, "Notification part failed");
                    parts.push(PartOutcome::Failed(e.to_string()));
                }
            }
        }

        Ok(NotificationReport { parts })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<()> {
        let resp = self.http.post(&self.endpoint).form(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("Pushover error {status}: {body}")));
        }
        Ok(())
    }
}
