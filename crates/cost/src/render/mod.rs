//! Plain-text report rendering.
//!
//! Rendering is pure formatting: every section is built from values already
//! fetched and compared, and identical inputs produce byte-identical text.
//! Sections with nothing to report render as an empty string.

mod number;
mod table;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

pub use number::{format_usd, group_thousands};
pub use table::Table;

use crate::providers::{OrgCost, ProjectedCost, TagAttribution};
use crate::usage::{ComparisonRow, PaceStatus};

/// Closing line of a chat report.
pub const BILLING_USAGE_FOOTER: &str =
    "More details can be found at https://app.datadoghq.com/billing/usage";

/// Charge type of the per-product totals in a cost breakdown.
pub const TOTAL_CHARGE_TYPE: &str = "total";

/// Label for attribution rows without a value for the requested tag.
pub const UNTAGGED_LABEL: &str = "<untagged>";

/// Default number of rows in "top n" sections.
pub const DEFAULT_TOP: usize = 5;

const COST_SUFFIX: &str = "_total_cost";
const PERCENTAGE_MARKER: &str = "_percentage";
const CODE_FENCE: &str = "```";

/// Where rendered text is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderTarget {
    /// Standard output. Tables are emitted bare.
    #[default]
    Terminal,
    /// A chat message. Tables are wrapped in code fences so they stay aligned.
    Chat,
}

/// Renders each report section as text for one [`RenderTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRenderer {
    target: RenderTarget,
    top: usize,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(RenderTarget::default())
    }
}

impl ReportRenderer {
    /// Create a renderer showing the top [`DEFAULT_TOP`] rows of ranked sections.
    #[must_use]
    pub fn new(target: RenderTarget) -> Self {
        Self {
            target,
            top: DEFAULT_TOP,
        }
    }

    /// Number of rows shown per organization in ranked sections.
    #[must_use]
    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    // ========================================================================
    // Sections
    // ========================================================================

    /// Month-over-month usage, one block per organization.
    ///
    /// `rows` must keep each organization's rows contiguous, as the comparator
    /// yields them. Organizations without a comparable dimension get no block.
    #[must_use]
    pub fn billable_comparison<I>(&self, rows: I, today: NaiveDate, pace: u32) -> String
    where
        I: IntoIterator<Item = ComparisonRow>,
    {
        let month = today.format("%B").to_string();
        let mut out = String::new();
        let mut current: Option<(String, Table)> = None;

        for row in rows {
            if !matches!(&current, Some((org, _)) if *org == row.organization) {
                if let Some((_, table)) = current.take() {
                    self.push_table(&mut out, &table);
                }
                out.push_str(&format!(
                    "Datadog: Percentage difference of usage for {} between last month and this month. \
                     Current month of {month} is {pace}% complete.\n",
                    row.organization
                ));
                current = Some((row.organization.clone(), Table::new()));
            }

            if let Some((_, table)) = current.as_mut() {
                table.push_line(&format!(
                    "{}:\t\t{:.0}%\t{}\t{}",
                    row.billing_dimension,
                    row.percent_diff,
                    row.usage_unit,
                    pace_marker(row.status)
                ));
            }
        }

        if let Some((_, table)) = current {
            self.push_table(&mut out, &table);
        }
        out
    }

    /// Estimated month-to-date cost per organization with its most expensive products.
    ///
    /// Only charges of type [`TOTAL_CHARGE_TYPE`] are ranked, highest first.
    #[must_use]
    pub fn estimated_cost(&self, costs: &[OrgCost]) -> String {
        let mut out = String::new();

        for org in costs {
            out.push_str(&format!(
                "{} Datadog monthly total cost for {} is: {}\n",
                org.org_name,
                org.date.format("%Y-%m"),
                format_usd(org.total_cost)
            ));
            out.push_str(&format!("Top {} total costs are:\n", self.top));

            let mut totals: Vec<_> = org
                .charges
                .iter()
                .filter(|charge| charge.charge_type == TOTAL_CHARGE_TYPE)
                .collect();
            totals.sort_by(|a, b| b.cost.total_cmp(&a.cost));

            let mut table = Table::new();
            for charge in totals.into_iter().take(self.top) {
                table.push_line(&format!(
                    "{}:\t\t{}",
                    charge.product_name,
                    format_usd(charge.cost)
                ));
            }
            self.push_table(&mut out, &table);
        }

        out
    }

    /// Projected end-of-month cost per organization.
    #[must_use]
    pub fn projected_cost(&self, costs: &[ProjectedCost]) -> String {
        let mut out = String::new();

        for org in costs {
            let date = org.date.format("%Y-%m-%d");
            if org.projected_total_cost.abs() < f64::EPSILON {
                out.push_str(&format!(
                    "Datadog: No total monthly projected costs for {} as of {date}\n",
                    org.org_name
                ));
            } else {
                out.push_str(&format!(
                    "Datadog: Monthly Datadog projected total costs for {} as of {date} is: {}\n",
                    org.org_name,
                    format_usd(org.projected_total_cost)
                ));
            }
        }

        out
    }

    /// Share of usage missing every requested tag.
    ///
    /// Only attribution rows with no value for any of `tag_breakdown_keys` are
    /// reported, and only their non-zero `_percentage` values.
    #[must_use]
    pub fn untagged_usage(
        &self,
        rows: &[TagAttribution],
        tag_breakdown_keys: &str,
        report_month: NaiveDate,
    ) -> String {
        let mut out = String::new();

        for row in rows.iter().filter(|row| row.is_untagged()) {
            out.push_str(&format!(
                "Datadog: The percentage of usage that is missing all the \"{tag_breakdown_keys}\" tags, \
                 greater than 0%, for the month of {} in {} is:\n",
                month_name(row.month, report_month),
                row.org_name
            ));

            let mut table = Table::new();
            for (key, value) in &row.values {
                if *value > 0.0 && key.contains(PERCENTAGE_MARKER) {
                    table.push_line(&format!("{key}:\t{value:.2}%"));
                }
            }
            self.push_table(&mut out, &table);
        }

        out
    }

    /// Most expensive values of `attribution_key` per organization.
    ///
    /// Each row's cost is the sum of its `*_total_cost` values; rows sharing a
    /// tag value are added together. Rows without a value are grouped under
    /// [`UNTAGGED_LABEL`].
    #[must_use]
    pub fn cost_attribution(
        &self,
        rows: &[TagAttribution],
        attribution_key: &str,
        report_month: NaiveDate,
    ) -> String {
        let mut by_org: BTreeMap<&str, (Option<DateTime<Utc>>, BTreeMap<String, f64>)> =
            BTreeMap::new();

        for row in rows {
            let (month, totals) = by_org
                .entry(row.org_name.as_str())
                .or_insert_with(|| (row.month, BTreeMap::new()));
            if month.is_none() {
                *month = row.month;
            }
            *totals.entry(tag_label(row, attribution_key)).or_default() += total_cost(row);
        }

        let mut out = String::new();
        for (org, (month, totals)) in by_org {
            out.push_str(&format!(
                "Datadog: Top {} monthly costs by \"{attribution_key}\" tag for {org} in {}:\n",
                self.top,
                month_name(month, report_month)
            ));

            let mut ranked: Vec<_> = totals.into_iter().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            let mut table = Table::new();
            for (label, cost) in ranked.into_iter().take(self.top) {
                table.push_line(&format!("{label}:\t\t{}", format_usd(cost)));
            }
            self.push_table(&mut out, &table);
        }

        out
    }

    fn push_table(&self, out: &mut String, table: &Table) {
        if table.is_empty() {
            return;
        }
        match self.target {
            RenderTarget::Terminal => out.push_str(&table.render()),
            RenderTarget::Chat => {
                out.push_str(CODE_FENCE);
                out.push('\n');
                out.push_str(&table.render());
                out.push_str(CODE_FENCE);
                out.push('\n');
            }
        }
    }
}

fn pace_marker(status: PaceStatus) -> &'static str {
    match status {
        PaceStatus::OnPace => "🥳",
        PaceStatus::OverPace => "💸",
    }
}

fn month_name(month: Option<DateTime<Utc>>, fallback: NaiveDate) -> String {
    month.map_or_else(
        || fallback.format("%B").to_string(),
        |m| m.format("%B").to_string(),
    )
}

fn tag_label(row: &TagAttribution, key: &str) -> String {
    match row.tags.get(key) {
        Some(values) if !values.is_empty() => values.join(","),
        _ => UNTAGGED_LABEL.to_string(),
    }
}

fn total_cost(row: &TagAttribution) -> f64 {
    row.values
        .iter()
        .filter(|(key, _)| key.ends_with(COST_SUFFIX))
        .map(|(_, value)| value)
        .sum()
}
