#![allow(clippy::doc_markdown)] // Allow brand names like Datadog, Slack without backticks

//! Usage and cost reporting for Datadog accounts.
//!
//! This crate turns the Datadog usage metering API into plain-text reports:
//!
//! - **providers** - the `UsageMeteringApi` trait and its Datadog client
//! - **usage** - canonical billable usage records, normalization, and
//!   month-over-month comparison against the pace of the month
//! - **render** - text sections for a terminal or a chat message
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chrono::{Months, Utc};
//! use pyro_cost::providers::{DatadogUsageClient, UsageMeteringApi};
//! use pyro_cost::DatadogConfig;
//! use pyro_cost::render::{RenderTarget, ReportRenderer};
//! use pyro_cost::usage::{comparison_rows, normalize, percentage_of_month};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads DD_API_KEY, DD_APP_KEY and DD_SITE
//!     let client = DatadogUsageClient::new(DatadogConfig::from_env()?)?;
//!
//!     let today = Utc::now().date_naive();
//!     let last_month = today.checked_sub_months(Months::new(1)).unwrap_or(today);
//!
//!     let current = normalize(&client.billable_summary(today, true).await?)?;
//!     let prior = normalize(&client.billable_summary(last_month, true).await?)?;
//!
//!     let pace = percentage_of_month(today);
//!     let text = ReportRenderer::new(RenderTarget::Terminal).billable_comparison(
//!         comparison_rows(&current, &prior, pace),
//!         today,
//!         pace,
//!     );
//!     print!("{text}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Response shapes
//!
//! The billable summary reports each usage category either as a typed field or
//! inside an open-ended extension map. [`usage::normalize`] accepts both and
//! keys every record by its own `billing_dimension`, so the comparison never
//! depends on which shape a dimension arrived in.

pub mod config;
pub mod providers;
pub mod render;
pub mod usage;

pub use config::DatadogConfig;
pub use providers::{
    Charge, DatadogUsageClient, OrgCost, ProjectedCost, TagAttribution, UsageApiError,
    UsageMeteringApi,
};
pub use render::{RenderTarget, ReportRenderer};
pub use usage::{
    CanonicalUsageRecord, ComparisonRow, MonthProgress, NoBaseline, NormalizeError, PaceStatus,
    Snapshot,
};
