//! Incident notification.
//!
//! Delivery is best-effort: incidents are persisted before they reach the
//! queue, and a failed send is only logged.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::db::{IncidentEvent, Status};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

/// Outbound channel for incident alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &IncidentEvent) -> Result<(), NotifyError>;
}

/// Sends incidents to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_api_base(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Send a raw HTML-formatted message.
    pub async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .timeout(NOTIFY_TIMEOUT)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &IncidentEvent) -> Result<(), NotifyError> {
        self.send_message(&format_incident_message(event)).await
    }
}

/// Fallback used when no messaging transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &IncidentEvent) -> Result<(), NotifyError> {
        tracing::info!(
            "Notifications not configured, would send:\n{}",
            format_incident_message(event)
        );
        Ok(())
    }
}

/// Render an incident as an HTML chat message.
pub fn format_incident_message(event: &IncidentEvent) -> String {
    let title = match (event.prev_status, event.new_status) {
        (_, Status::Down) => "🔴 <b>Service down</b>",
        (Status::Down, Status::Up) => "✅ <b>Service recovered</b>",
        (_, Status::Degraded) => "⚠️ <b>Service degraded</b>",
        _ => "ℹ️ <b>Status changed</b>",
    };

    let mut lines = vec![
        title.to_string(),
        String::new(),
        format!("🔗 {}", escape_html(&event.url)),
        format!("📊 {} → {}", event.prev_status, event.new_status),
    ];

    if let Some(error) = &event.error {
        lines.push(format!("❗ {}", escape_html(error)));
    }
    if let (Some(since), Some(downtime)) = (event.was_down_since, event.downtime()) {
        lines.push(format!(
            "⏱️ Down since: {} ({}m {}s)",
            since.to_rfc3339(),
            downtime.num_minutes(),
            downtime.num_seconds() % 60
        ));
    }
    lines.push(format!("🕐 {}", event.changed_at.to_rfc3339()));

    lines.join("\n")
}

/// Escape text for Telegram's HTML parse mode.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Bounded hand-off between the check cycle and the notifier.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<IncidentEvent>,
}

impl NotificationQueue {
    /// Spawn the delivery worker and return the queue feeding it.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(run_notification_worker(rx, notifier));
        Self::from_sender(tx)
    }

    pub fn from_sender(tx: mpsc::Sender<IncidentEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event without waiting. Drops it if the queue is full or closed.
    pub fn enqueue(&self, event: IncidentEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("Notification queue full, dropping alert for {}", event.url);
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!("Notification worker gone, dropping alert for {}", event.url);
                false
            }
        }
    }
}

async fn run_notification_worker(mut rx: mpsc::Receiver<IncidentEvent>, notifier: Arc<dyn Notifier>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = notifier.notify(&event).await {
            tracing::error!("Failed to send notification for {}: {}", event.url, e);
        }
    }
}
