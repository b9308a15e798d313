//! The Datadog report: independent sub-reports printed and mirrored to chat.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{Months, NaiveDate};
use notify::{Message, Notifier};
use pyro_cost::render::{RenderTarget, ReportRenderer, BILLING_USAGE_FOOTER};
use pyro_cost::usage::{comparison_rows, normalize, ComparisonRow, MonthProgress};
use pyro_cost::{NormalizeError, UsageApiError, UsageMeteringApi};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ReportConfig;

/// One independently fetched and rendered section of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubReport {
    /// Month-to-date estimated cost per organization.
    EstimatedCost,
    /// Projected end-of-month cost.
    ProjectedCost,
    /// Usage missing the requested tags.
    UntaggedUsage,
    /// Cost ranked by the values of one tag.
    CostAttribution,
    /// Billable usage this month against last month.
    BillableSummary,
}

impl SubReport {
    /// Sub-reports in the order they run.
    pub const ALL: [Self; 5] = [
        Self::EstimatedCost,
        Self::ProjectedCost,
        Self::UntaggedUsage,
        Self::CostAttribution,
        Self::BillableSummary,
    ];

    /// Name of the API operation behind this sub-report.
    #[must_use]
    pub fn operation(self) -> &'static str {
        match self {
            Self::EstimatedCost => "UsageMeteringApi.GetEstimatedCostByOrg",
            Self::ProjectedCost => "UsageMeteringApi.GetProjectedCost",
            Self::UntaggedUsage => "UsageMeteringApi.GetMonthlyUsageAttribution",
            Self::CostAttribution => "UsageMeteringApi.GetMonthlyCostAttribution",
            Self::BillableSummary => "UsageMeteringApi.GetUsageBillableSummary",
        }
    }
}

impl fmt::Display for SubReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EstimatedCost => "estimated-cost",
            Self::ProjectedCost => "projected-cost",
            Self::UntaggedUsage => "untagged-usage",
            Self::CostAttribution => "cost-attribution",
            Self::BillableSummary => "billable-summary",
        };
        f.write_str(name)
    }
}

/// Why a sub-report produced no output.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The usage API call failed.
    #[error(transparent)]
    Api(#[from] UsageApiError),

    /// A billable summary response could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl ReportError {
    /// HTTP status of the failed call, if there was a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.status(),
            Self::Normalize(_) => None,
        }
    }
}

/// Outcome of a whole report run.
#[derive(Debug, Default)]
pub struct ReportSummary {
    /// Sub-reports that rendered.
    pub completed: Vec<SubReport>,
    /// Sub-reports that were not configured.
    pub skipped: Vec<SubReport>,
    /// Sub-reports that failed, with the reason.
    pub failed: Vec<(SubReport, ReportError)>,
    /// Chat messages accepted by at least one channel.
    pub messages_delivered: usize,
}

impl ReportSummary {
    /// Whether every configured sub-report rendered.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Rendered {
    terminal: String,
    chat: String,
}

/// Runs every sub-report against a usage API.
///
/// Sub-reports are independent: a failure is reported as a diagnostic and the
/// next one still runs. Terminal text goes to the output writer; chat text goes
/// to the notifier, followed by a closing link once all sections are sent.
pub struct ReportRunner {
    api: Arc<dyn UsageMeteringApi>,
    clock: Arc<dyn MonthProgress>,
    notifier: Notifier,
    config: ReportConfig,
}

impl ReportRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(
        api: Arc<dyn UsageMeteringApi>,
        clock: Arc<dyn MonthProgress>,
        notifier: Notifier,
        config: ReportConfig,
    ) -> Self {
        Self {
            api,
            clock,
            notifier,
            config,
        }
    }

    /// Run every sub-report, writing terminal text to `out` and failures to `diagnostics`.
    ///
    /// Write failures are logged and never stop the run.
    #[instrument(skip_all, fields(provider = self.api.name()))]
    pub async fn run<O, D>(&self, out: &mut O, diagnostics: &mut D) -> ReportSummary
    where
        O: Write,
        D: Write,
    {
        let today = self.clock.today();
        let mut summary = ReportSummary::default();
        info!(
            api = self.api.name(),
            %today,
            channels = self.notifier.channel_count(),
            "Starting report"
        );

        for report in SubReport::ALL {
            if report == SubReport::CostAttribution && self.config.cost_attribution_key.is_none() {
                debug!(report = %report, "No cost attribution key, skipping");
                summary.skipped.push(report);
                continue;
            }

            match self.section(report, today).await {
                Ok(rendered) => {
                    info!(report = %report, "Sub-report rendered");
                    if let Err(e) = out.write_all(rendered.terminal.as_bytes()) {
                        warn!(report = %report, error = %e, "Failed to write report");
                    }
                    summary.messages_delivered += self.send(rendered.chat).await;
                    summary.completed.push(report);
                }
                Err(err) => {
                    warn!(report = %report, error = %err, "Sub-report failed");
                    write_diagnostic(diagnostics, report, &err);
                    summary.failed.push((report, err));
                }
            }
        }

        if let Err(e) = out.flush() {
            warn!(error = %e, "Failed to flush report output");
        }

        summary.messages_delivered += self.send(BILLING_USAGE_FOOTER.to_string()).await;
        summary
    }

    async fn send(&self, text: String) -> usize {
        if !self.notifier.has_channels() {
            return 0;
        }
        usize::from(self.notifier.notify(&Message::new(text)).await > 0)
    }

    async fn section(&self, report: SubReport, today: NaiveDate) -> Result<Rendered, ReportError> {
        match report {
            SubReport::EstimatedCost => {
                let costs = self.api.estimated_cost_by_org(today).await?;
                Ok(self.render(|r| r.estimated_cost(&costs)))
            }
            SubReport::ProjectedCost => {
                let costs = self.api.projected_cost(true).await?;
                Ok(self.render(|r| r.projected_cost(&costs)))
            }
            SubReport::UntaggedUsage => {
                let keys = &self.config.tag_breakdown_keys;
                let rows = self.api.monthly_usage_attribution(today, keys).await?;
                Ok(self.render(|r| r.untagged_usage(&rows, keys, today)))
            }
            SubReport::CostAttribution => {
                let key = self.config.cost_attribution_key.as_deref().unwrap_or_default();
                let rows = self.api.monthly_cost_attribution(today, key).await?;
                Ok(self.render(|r| r.cost_attribution(&rows, key, today)))
            }
            SubReport::BillableSummary => {
                let pace = self.clock.percentage_of_month();
                let rows = self.billable_comparison(today, pace).await?;
                Ok(self.render(|r| r.billable_comparison(rows.iter().cloned(), today, pace)))
            }
        }
    }

    async fn billable_comparison(
        &self,
        today: NaiveDate,
        pace: u32,
    ) -> Result<Vec<ComparisonRow>, ReportError> {
        let last_month = today.checked_sub_months(Months::new(1)).unwrap_or(today);

        let prior = normalize(&self.api.billable_summary(last_month, true).await?)?;
        let current = normalize(&self.api.billable_summary(today, true).await?)?;

        debug!(
            current_records = current.record_count(),
            prior_records = prior.record_count(),
            pace,
            "Comparing billable usage"
        );
        Ok(comparison_rows(&current, &prior, pace).collect())
    }

    fn render(&self, section: impl Fn(&ReportRenderer) -> String) -> Rendered {
        let terminal = ReportRenderer::new(RenderTarget::Terminal).with_top(self.config.top);
        let chat = ReportRenderer::new(RenderTarget::Chat).with_top(self.config.top);
        Rendered {
            terminal: section(&terminal),
            chat: section(&chat),
        }
    }
}

fn write_diagnostic<D: Write>(diagnostics: &mut D, report: SubReport, err: &ReportError) {
    let mut line = format!("Error when calling `{}`: {err}\n", report.operation());
    if let Some(status) = err.status() {
        line.push_str(&format!("Full HTTP response: status {status}\n"));
    }
    if let Err(e) = diagnostics.write_all(line.as_bytes()) {
        warn!(error = %e, "Failed to write diagnostic");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use notify::{ChannelError, NotifyChannel};
    use pyro_cost::providers::datadog::BillableSummaryResponse;
    use pyro_cost::usage::FixedDate;
    use pyro_cost::{Charge, OrgCost, ProjectedCost, TagAttribution};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    // ========================================================================
    // Fakes
    // ========================================================================

    #[derive(Default)]
    struct FakeApi {
        fail_estimated: bool,
        fail_billable: bool,
        malformed_billable: bool,
        months_requested: Mutex<Vec<NaiveDate>>,
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn billable(usage: i64) -> BillableSummaryResponse {
        serde_json::from_value(json!({
            "usage": [{
                "org_name": "Acme",
                "usage": {
                    "infra_host_sum": {
                        "billing_dimension": "infra_host",
                        "account_billable_usage": usage,
                        "usage_unit": "hosts"
                    },
                    "ext1": {
                        "billing_dimension": "storage",
                        "account_billable_usage": usage * 10,
                        "usage_unit": "GB"
                    }
                }
            }]
        }))
        .unwrap()
    }

    #[async_trait]
    impl UsageMeteringApi for FakeApi {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn estimated_cost_by_org(
            &self,
            _start_month: NaiveDate,
        ) -> Result<Vec<OrgCost>, UsageApiError> {
            if self.fail_estimated {
                return Err(UsageApiError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(vec![OrgCost {
                org_name: "Acme".to_string(),
                date: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                total_cost: 1_234.5,
                charges: vec![Charge {
                    product_name: "infra_host".to_string(),
                    charge_type: "total".to_string(),
                    cost: 1_234.5,
                }],
            }])
        }

        async fn projected_cost(
            &self,
            _include_connected_accounts: bool,
        ) -> Result<Vec<ProjectedCost>, UsageApiError> {
            Ok(vec![ProjectedCost {
                org_name: "Acme".to_string(),
                date: Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap(),
                projected_total_cost: 2_000.0,
            }])
        }

        async fn monthly_usage_attribution(
            &self,
            _start_month: NaiveDate,
            tag_breakdown_keys: &str,
        ) -> Result<Vec<TagAttribution>, UsageApiError> {
            Ok(vec![TagAttribution {
                org_name: "Acme".to_string(),
                month: None,
                tags: BTreeMap::from([(tag_breakdown_keys.to_string(), vec![])]),
                values: BTreeMap::from([("infra_host_percentage".to_string(), 25.0)]),
            }])
        }

        async fn monthly_cost_attribution(
            &self,
            _start_month: NaiveDate,
            tag_breakdown_keys: &str,
        ) -> Result<Vec<TagAttribution>, UsageApiError> {
            Ok(vec![TagAttribution {
                org_name: "Acme".to_string(),
                month: None,
                tags: BTreeMap::from([(tag_breakdown_keys.to_string(), vec!["core".to_string()])]),
                values: BTreeMap::from([("infra_host_total_cost".to_string(), 99.0)]),
            }])
        }

        async fn billable_summary(
            &self,
            month: NaiveDate,
            _include_connected_accounts: bool,
        ) -> Result<BillableSummaryResponse, UsageApiError> {
            self.months_requested.lock().unwrap().push(month);
            if self.fail_billable {
                return Err(UsageApiError::Unauthorized {
                    status: 403,
                    message: "Forbidden".to_string(),
                });
            }
            if self.malformed_billable {
                return Ok(serde_json::from_value(json!({
                    "usage": [{
                        "org_name": "Acme",
                        "usage": { "ext1": { "account_billable_usage": 1, "usage_unit": "GB" } }
                    }]
                }))
                .unwrap());
            }
            if month == june(15) {
                Ok(billable(150))
            } else {
                Ok(billable(100))
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn send(&self, message: &Message) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.text.clone());
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl NotifyChannel for FailingChannel {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn send(&self, _message: &Message) -> Result<(), ChannelError> {
            Err(ChannelError::RateLimited {
                retry_after_secs: 30,
            })
        }
    }

    fn runner(api: FakeApi, notifier: Notifier, config: ReportConfig) -> ReportRunner {
        ReportRunner::new(Arc::new(api), Arc::new(FixedDate(june(15))), notifier, config)
    }

    async fn run(runner: &ReportRunner) -> (ReportSummary, String, String) {
        let mut out = Vec::new();
        let mut diagnostics = Vec::new();
        let summary = runner.run(&mut out, &mut diagnostics).await;
        (
            summary,
            String::from_utf8(out).unwrap(),
            String::from_utf8(diagnostics).unwrap(),
        )
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn test_full_report_to_terminal() {
        let config = ReportConfig::new("team").with_cost_attribution_key("team");
        let runner = runner(FakeApi::default(), Notifier::disabled(), config);

        let (summary, out, diagnostics) = run(&runner).await;

        assert!(summary.is_clean());
        assert_eq!(summary.completed, SubReport::ALL.to_vec());
        assert_eq!(summary.messages_delivered, 0);
        assert!(diagnostics.is_empty());

        assert!(out.contains("Acme Datadog monthly total cost for 2024-06 is: $1,234.50\n"));
        assert!(out.contains("Monthly Datadog projected total costs for Acme as of 2024-06-15 is: $2,000.00"));
        assert!(out.contains("missing all the \"team\" tags"));
        assert!(out.contains("infra_host_percentage: 25.00%\n"));
        assert!(out.contains("core:  $99.00\n"));
        assert!(out.contains("Current month of June is 50% complete.\n"));
        assert!(out.contains("infra_host:  150% hosts 💸\n"));
        assert!(out.contains("storage:     150% GB    💸\n"));
        assert!(!out.contains("```"));
        assert!(!out.contains(BILLING_USAGE_FOOTER));
    }

    #[tokio::test]
    async fn test_billable_summary_compares_against_previous_month() {
        let api = Arc::new(FakeApi::default());
        let runner = ReportRunner::new(
            api.clone(),
            Arc::new(FixedDate(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())),
            Notifier::disabled(),
            ReportConfig::default(),
        );

        let mut out = Vec::new();
        let _ = runner.run(&mut out, &mut std::io::sink()).await;

        let months = api.months_requested.lock().unwrap().clone();
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_sub_report_does_not_stop_others() {
        let api = FakeApi {
            fail_estimated: true,
            ..FakeApi::default()
        };
        let runner = runner(api, Notifier::disabled(), ReportConfig::new("team"));

        let (summary, out, diagnostics) = run(&runner).await;

        assert!(!summary.is_clean());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, SubReport::EstimatedCost);
        assert_eq!(summary.failed[0].1.status(), Some(503));
        assert_eq!(summary.skipped, vec![SubReport::CostAttribution]);
        assert_eq!(
            summary.completed,
            vec![
                SubReport::ProjectedCost,
                SubReport::UntaggedUsage,
                SubReport::BillableSummary
            ]
        );

        assert!(!out.contains("monthly total cost"));
        assert!(out.contains("projected total costs"));
        assert!(out.contains("infra_host:  150% hosts"));
        assert!(diagnostics
            .contains("Error when calling `UsageMeteringApi.GetEstimatedCostByOrg`: API error: 503 - unavailable"));
        assert!(diagnostics.contains("Full HTTP response: status 503"));
    }

    #[tokio::test]
    async fn test_billable_summary_failure_is_isolated() {
        let api = FakeApi {
            fail_billable: true,
            ..FakeApi::default()
        };
        let runner = runner(api, Notifier::disabled(), ReportConfig::new("team"));

        let (summary, out, diagnostics) = run(&runner).await;

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, SubReport::BillableSummary);
        assert!(out.contains("monthly total cost"));
        assert!(!out.contains("Percentage difference"));
        assert!(diagnostics.contains("GetUsageBillableSummary"));
        assert!(diagnostics.contains("Full HTTP response: status 403"));
    }

    #[tokio::test]
    async fn test_malformed_billable_summary_is_reported() {
        let api = FakeApi {
            malformed_billable: true,
            ..FakeApi::default()
        };
        let runner = runner(api, Notifier::disabled(), ReportConfig::new("team"));

        let (summary, _out, diagnostics) = run(&runner).await;

        assert!(matches!(
            summary.failed.as_slice(),
            [(SubReport::BillableSummary, ReportError::Normalize(_))]
        ));
        assert!(diagnostics.contains("billing_dimension"));
        assert!(!diagnostics.contains("Full HTTP response"));
    }

    #[tokio::test]
    async fn test_chat_receives_fenced_sections_and_footer() {
        let channel = Arc::new(RecordingChannel::default());
        let notifier = Notifier::with_channels(vec![channel.clone() as Arc<dyn NotifyChannel>]);
        let config = ReportConfig::new("team").with_cost_attribution_key("team");
        let runner = runner(FakeApi::default(), notifier, config);

        let (summary, out, _) = run(&runner).await;

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 6);
        assert_eq!(summary.messages_delivered, 6);
        assert!(sent[0].contains("```\ninfra_host:  $1,234.50\n```\n"));
        assert!(sent[1].starts_with("Datadog: Monthly Datadog projected total costs"));
        assert!(sent[4].contains("```\ninfra_host:  150% hosts 💸\n"));
        assert_eq!(sent[5], BILLING_USAGE_FOOTER);
        assert!(!out.contains("```"));
    }

    #[tokio::test]
    async fn test_failed_sections_are_not_sent_to_chat() {
        let channel = Arc::new(RecordingChannel::default());
        let notifier = Notifier::with_channels(vec![channel.clone() as Arc<dyn NotifyChannel>]);
        let api = FakeApi {
            fail_estimated: true,
            fail_billable: true,
            ..FakeApi::default()
        };
        let runner = runner(api, notifier, ReportConfig::new("team"));

        let _ = run(&runner).await;

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|text| !text.trim().is_empty()));
        assert_eq!(sent.last().map(String::as_str), Some(BILLING_USAGE_FOOTER));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_report() {
        let notifier = Notifier::with_channels(vec![Arc::new(FailingChannel) as Arc<dyn NotifyChannel>]);
        let runner = runner(FakeApi::default(), notifier, ReportConfig::new("team"));

        let (summary, out, diagnostics) = run(&runner).await;

        assert!(summary.is_clean());
        assert_eq!(summary.messages_delivered, 0);
        assert!(out.contains("monthly total cost"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_sub_report_names() {
        assert_eq!(SubReport::BillableSummary.to_string(), "billable-summary");
        assert_eq!(
            SubReport::ProjectedCost.operation(),
            "UsageMeteringApi.GetProjectedCost"
        );
    }
}
