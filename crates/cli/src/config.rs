//! Report configuration.

use std::sync::Arc;
use std::time::Duration;

use notify::{NotifyChannel, Notifier, SlackChannel};
use pyro_cost::config::{DatadogConfig, ENV_API_KEY, ENV_APP_KEY};
use pyro_cost::render::DEFAULT_TOP;
use pyro_cost::UsageApiError;
use thiserror::Error;
use url::Url;

/// Environment variable holding the Slack webhook reports are mirrored to.
pub const ENV_SLACK_WEBHOOK: &str = "REPORTS_SLACK_WEBHOOK";

/// Invalid startup configuration. Nothing has been reported yet.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential is missing or blank.
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    /// Datadog settings were rejected.
    #[error("invalid Datadog settings: {0}")]
    Datadog(#[from] UsageApiError),

    /// The Slack webhook is not an http(s) URL.
    #[error("invalid Slack webhook URL: {0}")]
    InvalidWebhook(String),

    /// `--top` was zero.
    #[error("top must be at least 1")]
    InvalidTop,
}

/// Build the Datadog connection settings from explicit values.
///
/// # Errors
///
/// Returns an error if a key is missing or blank, or the site is not a valid host.
pub fn datadog_config(
    api_key: Option<String>,
    app_key: Option<String>,
    site: Option<&str>,
    timeout: Duration,
) -> Result<DatadogConfig, ConfigError> {
    let api_key = non_blank(api_key).ok_or(ConfigError::MissingCredential(ENV_API_KEY))?;
    let app_key = non_blank(app_key).ok_or(ConfigError::MissingCredential(ENV_APP_KEY))?;

    let config = DatadogConfig::new(api_key, app_key)?.with_timeout(timeout);
    match site.map(str::trim).filter(|s| !s.is_empty()) {
        Some(site) => Ok(config.with_site(site)?),
        None => Ok(config),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// What to report and where to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Comma separated tag keys for the untagged usage report.
    pub tag_breakdown_keys: String,
    /// Tag key for the cost attribution report; the report is skipped when unset.
    pub cost_attribution_key: Option<String>,
    /// Rows per organization in ranked sections.
    pub top: usize,
    /// Slack incoming webhook mirroring the report.
    pub slack_webhook: Option<Url>,
    /// Timeout for webhook requests.
    pub webhook_timeout: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tag_breakdown_keys: String::new(),
            cost_attribution_key: None,
            top: DEFAULT_TOP,
            slack_webhook: None,
            webhook_timeout: pyro_cost::config::DEFAULT_TIMEOUT,
        }
    }
}

impl ReportConfig {
    /// Create a config reporting untagged usage for `tag_breakdown_keys`.
    #[must_use]
    pub fn new(tag_breakdown_keys: impl Into<String>) -> Self {
        Self {
            tag_breakdown_keys: tag_breakdown_keys.into(),
            ..Self::default()
        }
    }

    /// Report cost attribution by `key`. A blank key disables the report.
    #[must_use]
    pub fn with_cost_attribution_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.cost_attribution_key = if key.trim().is_empty() {
            None
        } else {
            Some(key)
        };
        self
    }

    /// Rows per organization in ranked sections.
    ///
    /// # Errors
    ///
    /// Returns an error if `top` is zero.
    pub fn with_top(mut self, top: usize) -> Result<Self, ConfigError> {
        if top == 0 {
            return Err(ConfigError::InvalidTop);
        }
        self.top = top;
        Ok(self)
    }

    /// Mirror the report to a Slack incoming webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if `webhook` is not an http or https URL.
    pub fn with_slack_webhook(mut self, webhook: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(webhook.trim())
            .map_err(|e| ConfigError::InvalidWebhook(format!("{e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidWebhook(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        self.slack_webhook = Some(url);
        Ok(self)
    }

    /// Timeout for webhook requests.
    #[must_use]
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    /// Notifier for the configured webhook, or a disabled one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn notifier(&self) -> Result<Notifier, reqwest::Error> {
        let Some(webhook) = &self.slack_webhook else {
            return Ok(Notifier::disabled());
        };

        let client = reqwest::Client::builder()
            .timeout(self.webhook_timeout)
            .build()?;
        let slack: Arc<dyn NotifyChannel> =
            Arc::new(SlackChannel::with_client(webhook.as_str(), client));
        Ok(Notifier::with_channels(vec![slack]))
    }
}
