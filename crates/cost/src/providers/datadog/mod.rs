//! Datadog usage metering API client.
//!
//! This module provides integration with Datadog's usage metering endpoints:
//!
//! - **Estimated cost** (`v2`): month-to-date cost per organization.
//! - **Projected cost** (`v2`): end-of-month projection, available from around the 12th.
//! - **Monthly attribution** (`v1` usage, `v2` cost): usage and cost broken down by tag.
//! - **Billable summary** (`v1`): billable usage per product and organization.
//!
//! ## Authentication
//!
//! Requires an API key and an application key with usage read permission.
//! Both are supplied through [`DatadogConfig`](crate::config::DatadogConfig).
//!
//! ## Example
//!
//! ```rust,ignore
//! use pyro_cost::{DatadogConfig, DatadogUsageClient, UsageMeteringApi};
//!
//! let client = DatadogUsageClient::new(DatadogConfig::new("api-key", "app-key")?)?;
//! let summary = client.billable_summary(chrono::Utc::now().date_naive(), true).await?;
//! ```

mod client;
mod models;

pub use client::DatadogUsageClient;
pub use models::*;
