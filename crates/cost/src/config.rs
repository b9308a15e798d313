//! Datadog API connection settings.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::providers::UsageApiError;

/// Environment variable holding the Datadog API key.
pub const ENV_API_KEY: &str = "DD_API_KEY";
/// Environment variable holding the Datadog application key.
pub const ENV_APP_KEY: &str = "DD_APP_KEY";
/// Environment variable selecting the Datadog site (e.g. `datadoghq.eu`).
pub const ENV_SITE: &str = "DD_SITE";

/// Site used when `DD_SITE` is unset.
pub const DEFAULT_SITE: &str = "datadoghq.com";
/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials and endpoint for the Datadog usage metering API.
///
/// Built once at startup and handed to
/// [`DatadogUsageClient::new`](crate::providers::DatadogUsageClient::new);
/// nothing below this type reads the environment.
#[derive(Clone)]
pub struct DatadogConfig {
    api_key: String,
    app_key: String,
    base_url: Url,
    timeout: Duration,
}

impl DatadogConfig {
    /// Create a config for the default site.
    ///
    /// # Errors
    ///
    /// Returns an error if either key is empty.
    pub fn new(
        api_key: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Result<Self, UsageApiError> {
        let api_key = api_key.into();
        let app_key = app_key.into();
        if api_key.trim().is_empty() {
            return Err(UsageApiError::Auth("Datadog API key is required".to_string()));
        }
        if app_key.trim().is_empty() {
            return Err(UsageApiError::Auth(
                "Datadog application key is required".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            app_key,
            base_url: site_url(DEFAULT_SITE)?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Create a config from `DD_API_KEY`, `DD_APP_KEY` and optionally `DD_SITE`.
    ///
    /// # Errors
    ///
    /// Returns an error if a key variable is not set or the site is invalid.
    pub fn from_env() -> Result<Self, UsageApiError> {
        let api_key = std::env::var(ENV_API_KEY).map_err(|_| {
            UsageApiError::Auth(format!("{ENV_API_KEY} environment variable not set"))
        })?;
        let app_key = std::env::var(ENV_APP_KEY).map_err(|_| {
            UsageApiError::Auth(format!("{ENV_APP_KEY} environment variable not set"))
        })?;

        let config = Self::new(api_key, app_key)?;
        match std::env::var(ENV_SITE) {
            Ok(site) if !site.trim().is_empty() => config.with_site(&site),
            _ => Ok(config),
        }
    }

    /// Point the config at another Datadog site, e.g. `datadoghq.eu` or `us5.datadoghq.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the site does not form a valid URL.
    pub fn with_site(mut self, site: &str) -> Result<Self, UsageApiError> {
        self.base_url = site_url(site)?;
        Ok(self)
    }

    /// Use an explicit base URL instead of a site.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, UsageApiError> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| UsageApiError::Config(format!("invalid base URL {base_url}: {e}")))?;
        Ok(self)
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Application key.
    #[must_use]
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for DatadogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatadogConfig")
            .field("api_key", &"[REDACTED]")
            .field("app_key", &"[REDACTED]")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn site_url(site: &str) -> Result<Url, UsageApiError> {
    let site = site.trim().trim_start_matches("https://").trim_end_matches('/');
    let site = site.strip_prefix("api.").unwrap_or(site);
    Url::parse(&format!("https://api.{site}"))
        .map_err(|e| UsageApiError::Config(format!("invalid Datadog site {site}: {e}")))
}
