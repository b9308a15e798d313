//! Slack incoming webhook notification channel.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::message::Message;
use crate::NotifyChannel;

/// Wait suggested when Slack rate limits without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Slack incoming webhook channel.
///
/// Posts each message as `{"text": ...}`. Slack renders the text as mrkdwn,
/// so code fences keep report tables aligned.
pub struct SlackChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a Slack channel for a webhook URL.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self::with_client(webhook_url, reqwest::Client::new())
    }

    /// Create a Slack channel that sends through an existing HTTP client.
    #[must_use]
    pub fn with_client(webhook_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client,
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        if !self.enabled() {
            return Err(ChannelError::NotConfigured("slack webhook URL".to_string()));
        }

        let payload = SlackPayload {
            text: &message.text,
        };

        debug!(channel = "slack", bytes = message.text.len(), "Sending notification");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(channel = "slack", "Notification sent successfully");
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(channel = "slack", retry_after_secs, "Slack webhook rate limited");
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();

        warn!(
            channel = "slack",
            status = %status,
            body = %body,
            "Slack webhook request failed"
        );

        Err(ChannelError::Rejected {
            channel: "slack",
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}
