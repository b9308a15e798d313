//! Scheduled Datadog cost and usage reports.
//!
//! The `pyrocumulus` binary runs every sub-report of [`report::ReportRunner`]
//! once, prints the result, and mirrors it to Slack when a webhook is
//! configured. Sub-reports are independent and a failed one never fails the
//! run.

pub mod config;
pub mod report;

pub use config::{datadog_config, ConfigError, ReportConfig};
pub use report::{ReportError, ReportRunner, ReportSummary, SubReport};
