//! Usage metering provider implementations.
//!
//! This module provides integrations with:
//!
//! - Datadog - usage metering API (v1 and v2)

pub mod datadog;
mod traits;

pub use datadog::DatadogUsageClient;
pub use traits::{
    Charge, OrgCost, ProjectedCost, TagAttribution, UsageApiError, UsageMeteringApi,
};
