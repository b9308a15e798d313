//! Usage metering trait and common types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::datadog::BillableSummaryResponse;

/// Errors that can occur while talking to a usage metering API.
#[derive(Error, Debug)]
pub enum UsageApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Missing API or application key.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The API rejected the keys (401 or 403).
    #[error("Unauthorized: {status} - {message}")]
    Unauthorized { status: u16, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
}

impl UsageApiError {
    /// HTTP status attached to the failure, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Unauthorized { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            Self::Auth(_) | Self::Config(_) | Self::Serialization(_) => None,
        }
    }
}

// ============================================================================
// Cost types
// ============================================================================

/// One line of a chargeback breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    /// Product the charge belongs to (e.g. "infra_host").
    pub product_name: String,
    /// Charge type: "committed", "on_demand" or "total".
    pub charge_type: String,
    /// Cost in USD.
    pub cost: f64,
}

/// Estimated month-to-date cost for one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgCost {
    /// Organization name.
    pub org_name: String,
    /// Month the estimate covers.
    pub date: DateTime<Utc>,
    /// Total estimated cost in USD.
    pub total_cost: f64,
    /// Per-product breakdown.
    pub charges: Vec<Charge>,
}

/// Projected end-of-month cost for one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCost {
    /// Organization name.
    pub org_name: String,
    /// Date the projection was computed.
    pub date: DateTime<Utc>,
    /// Projected total in USD. Zero until the projection becomes available.
    pub projected_total_cost: f64,
}

// ============================================================================
// Attribution types
// ============================================================================

/// One attribution row: usage or cost for a single combination of tag values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagAttribution {
    /// Organization name.
    pub org_name: String,
    /// Month the row covers.
    pub month: Option<DateTime<Utc>>,
    /// Tag key to the values this row was attributed to. Empty lists mean untagged.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Numeric values keyed by metric name (e.g. `infra_host_percentage`).
    pub values: BTreeMap<String, f64>,
}

impl TagAttribution {
    /// Whether none of the requested tag keys carried a value.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.tags.values().all(Vec::is_empty)
    }
}

// ============================================================================
// Provider trait
// ============================================================================

/// Read-only access to a usage metering API.
///
/// Every method is a single logical request. Implementations handle
/// authentication and pagination; callers never retry.
#[async_trait]
pub trait UsageMeteringApi: Send + Sync {
    /// Get the provider name (e.g. "datadog").
    fn name(&self) -> &'static str;

    /// Estimated cost for every organization, for the month containing `start_month`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or authentication fails.
    async fn estimated_cost_by_org(
        &self,
        start_month: NaiveDate,
    ) -> Result<Vec<OrgCost>, UsageApiError>;

    /// Projected cost for the current month.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or authentication fails.
    async fn projected_cost(
        &self,
        include_connected_accounts: bool,
    ) -> Result<Vec<ProjectedCost>, UsageApiError>;

    /// Monthly usage attribution broken down by the comma separated `tag_breakdown_keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or authentication fails.
    async fn monthly_usage_attribution(
        &self,
        start_month: NaiveDate,
        tag_breakdown_keys: &str,
    ) -> Result<Vec<TagAttribution>, UsageApiError>;

    /// Monthly cost attribution broken down by the comma separated `tag_breakdown_keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or authentication fails.
    async fn monthly_cost_attribution(
        &self,
        start_month: NaiveDate,
        tag_breakdown_keys: &str,
    ) -> Result<Vec<TagAttribution>, UsageApiError>;

    /// Raw billable usage summary for the month containing `month`.
    ///
    /// The response is returned in wire form; see [`crate::usage::normalize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or authentication fails.
    async fn billable_summary(
        &self,
        month: NaiveDate,
        include_connected_accounts: bool,
    ) -> Result<BillableSummaryResponse, UsageApiError>;
}
