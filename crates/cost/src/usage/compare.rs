//! Month-over-month comparison of billable usage.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::record::{CanonicalUsageRecord, Snapshot};

/// Whether a dimension's usage is keeping pace with the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceStatus {
    /// Used no more of last month's total than the share of this month elapsed.
    OnPace,
    /// Ahead of the month; likely to end above last month.
    OverPace,
}

impl PaceStatus {
    /// Classify a percent difference against the percentage of month elapsed.
    ///
    /// The percent difference is truncated before comparing; equality is on pace.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn classify(percent_diff: f64, percentage_of_month: u32) -> Self {
        if percent_diff.trunc() as i64 <= i64::from(percentage_of_month) {
            Self::OnPace
        } else {
            Self::OverPace
        }
    }
}

/// One dimension of one organization, this month against last month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Organization name.
    pub organization: String,
    /// Billing dimension.
    pub billing_dimension: String,
    /// This month's account usage as a percentage of last month's.
    pub percent_diff: f64,
    /// Display unit.
    pub usage_unit: String,
    /// Pace classification.
    pub status: PaceStatus,
}

/// No usable prior-month figure for a dimension present this month.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no prior-month baseline for {billing_dimension} in {organization}")]
pub struct NoBaseline {
    /// Organization name.
    pub organization: String,
    /// Billing dimension.
    pub billing_dimension: String,
}

/// Compare `current` against `prior`, lazily, one item per dimension in `current`.
///
/// Organizations and dimensions are visited in name order. A dimension with no
/// prior record, or a prior account usage of zero, yields [`NoBaseline`].
/// Dimensions that only exist in `prior` are not visited.
pub fn compare<'a>(
    current: &'a Snapshot,
    prior: &'a Snapshot,
    percentage_of_month: u32,
) -> impl Iterator<Item = Result<ComparisonRow, NoBaseline>> + 'a {
    current.orgs().flat_map(move |(organization, dimensions)| {
        dimensions.values().map(move |record| {
            compare_record(organization, record, prior, percentage_of_month)
        })
    })
}

/// Like [`compare`], dropping dimensions without a baseline.
pub fn comparison_rows<'a>(
    current: &'a Snapshot,
    prior: &'a Snapshot,
    percentage_of_month: u32,
) -> impl Iterator<Item = ComparisonRow> + 'a {
    compare(current, prior, percentage_of_month).filter_map(|result| match result {
        Ok(row) => Some(row),
        Err(skipped) => {
            debug!(
                organization = %skipped.organization,
                billing_dimension = %skipped.billing_dimension,
                "Skipping dimension without baseline"
            );
            None
        }
    })
}

#[allow(clippy::cast_precision_loss)]
fn compare_record(
    organization: &str,
    record: &CanonicalUsageRecord,
    prior: &Snapshot,
    percentage_of_month: u32,
) -> Result<ComparisonRow, NoBaseline> {
    let baseline = prior
        .get(organization, &record.billing_dimension)
        .map(|previous| previous.account_billable_usage)
        .filter(|usage| *usage != 0)
        .ok_or_else(|| NoBaseline {
            organization: organization.to_string(),
            billing_dimension: record.billing_dimension.clone(),
        })?;

    let percent_diff = record.account_billable_usage as f64 / baseline as f64 * 100.0;

    Ok(ComparisonRow {
        organization: organization.to_string(),
        billing_dimension: record.billing_dimension.clone(),
        percent_diff,
        usage_unit: record.usage_unit.clone(),
        status: PaceStatus::classify(percent_diff, percentage_of_month),
    })
}
