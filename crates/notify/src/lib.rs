//! Chat notifications for pyrocumulus reports.
//!
//! This crate delivers rendered report text to chat services. Delivery is
//! best effort: failures are logged and never interrupt the report.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use notify::{Message, Notifier, SlackChannel};
//!
//! # async fn example() {
//! let slack: Arc<dyn notify::NotifyChannel> =
//!     Arc::new(SlackChannel::new("https://hooks.slack.com/services/T000/B000/XXXX"));
//! let notifier = Notifier::with_channels(vec![slack]);
//!
//! notifier.notify(&Message::new("Datadog monthly total cost is: $1,234.00")).await;
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`SlackChannel`] implements Slack incoming webhook notifications
//! - [`Notifier`] dispatches messages to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod message;

pub use channels::slack::SlackChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use message::Message;

use std::sync::Arc;
use tracing::{debug, error};

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and sends each
/// message to every enabled channel, one after another.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (no webhook configured, or for testing).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a message to all enabled channels.
    ///
    /// Errors are logged but not propagated to the caller. Returns the number
    /// of channels that accepted the message.
    pub async fn notify(&self, message: &Message) -> usize {
        let mut delivered = 0;

        for (channel_name, result) in self.notify_and_wait(message).await {
            match result {
                Ok(()) => {
                    debug!(channel = %channel_name, "Notification sent");
                    delivered += 1;
                }
                Err(e) => {
                    error!(
                        channel = %channel_name,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }

        delivered
    }

    /// Send a message and collect the result of every channel.
    ///
    /// Disabled channels and blank messages are skipped.
    pub async fn notify_and_wait(
        &self,
        message: &Message,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        if message.is_blank() {
            debug!("Blank message, skipping");
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            let channel_name = channel.name();
            if !channel.enabled() {
                debug!(channel = channel_name, "Channel disabled, skipping");
                continue;
            }
            let result = channel.send(message).await;
            results.push((channel_name.to_string(), result));
        }

        results
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}
