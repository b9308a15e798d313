//! Datadog usage metering API client.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::models::{
    BillableSummaryResponse, CostByOrgResponse, DatadogError, MonthlyCostAttributionResponse,
    MonthlyUsageAttributionResponse, ProjectedCostResponse,
};
use crate::config::DatadogConfig;
use crate::providers::{
    OrgCost, ProjectedCost, TagAttribution, UsageApiError, UsageMeteringApi,
};

const ESTIMATED_COST_PATH: &str = "/api/v2/usage/estimated_cost";
const PROJECTED_COST_PATH: &str = "/api/v2/usage/projected_cost";
const COST_ATTRIBUTION_PATH: &str = "/api/v2/cost_by_tag/monthly_cost_attribution";
const USAGE_ATTRIBUTION_PATH: &str = "/api/v1/usage/monthly-attribution";
const BILLABLE_SUMMARY_PATH: &str = "/api/v1/usage/billable-summary";

/// Request every supported attribution metric.
const ALL_FIELDS: &str = "*";

/// Upper bound on attribution pages followed in one call.
const MAX_ATTRIBUTION_PAGES: usize = 100;

/// Datadog usage metering API client.
///
/// Covers the v1 and v2 endpoints the reports need. Authentication uses the
/// API and application keys from [`DatadogConfig`].
#[derive(Debug, Clone)]
pub struct DatadogUsageClient {
    client: Client,
    config: DatadogConfig,
}

impl DatadogUsageClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: DatadogConfig) -> Result<Self, UsageApiError> {
        let client = Client::builder()
            .user_agent(concat!("pyrocumulus/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(UsageApiError::Http)?;

        Ok(Self { client, config })
    }

    /// Make a GET request to the Datadog API.
    async fn get<T>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T, UsageApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self
            .config
            .base_url()
            .join(endpoint)
            .map_err(|e| UsageApiError::Config(format!("invalid endpoint {endpoint}: {e}")))?;
        debug!(url = %url, ?query, "Making Datadog API request");

        let response = self
            .client
            .get(url)
            .query(query)
            .header("DD-API-KEY", self.config.api_key())
            .header("DD-APPLICATION-KEY", self.config.app_key())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<DatadogError>(&error_text)
                .ok()
                .filter(|e| !e.errors.is_empty())
                .map_or(error_text, |e| e.errors.join("; "));

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => UsageApiError::RateLimited(message),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UsageApiError::Unauthorized {
                    status: status.as_u16(),
                    message,
                },
                _ => UsageApiError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(UsageApiError::Serialization)
    }

    /// Format a date as the `YYYY-MM` month the API expects.
    fn format_month(date: NaiveDate) -> String {
        date.format("%Y-%m").to_string()
    }

    fn attribution_query(
        start_month: NaiveDate,
        tag_breakdown_keys: &str,
        next_record_id: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("start_month", Self::format_month(start_month)),
            ("fields", ALL_FIELDS.to_string()),
        ];
        if !tag_breakdown_keys.is_empty() {
            query.push(("tag_breakdown_keys", tag_breakdown_keys.to_string()));
        }
        if let Some(id) = next_record_id {
            query.push(("next_record_id", id.to_string()));
        }
        query
    }
}

#[async_trait]
impl UsageMeteringApi for DatadogUsageClient {
    fn name(&self) -> &'static str {
        "datadog"
    }

    #[instrument(skip(self), fields(provider = "datadog"))]
    async fn estimated_cost_by_org(
        &self,
        start_month: NaiveDate,
    ) -> Result<Vec<OrgCost>, UsageApiError> {
        let query = [("start_month", Self::format_month(start_month))];
        let response: CostByOrgResponse = self.get(ESTIMATED_COST_PATH, &query).await?;
        Ok(response.data.into_iter().map(OrgCost::from).collect())
    }

    #[instrument(skip(self), fields(provider = "datadog"))]
    async fn projected_cost(
        &self,
        include_connected_accounts: bool,
    ) -> Result<Vec<ProjectedCost>, UsageApiError> {
        let query = [(
            "include_connected_accounts",
            include_connected_accounts.to_string(),
        )];
        let response: ProjectedCostResponse = self.get(PROJECTED_COST_PATH, &query).await?;
        Ok(response.data.into_iter().map(ProjectedCost::from).collect())
    }

    #[instrument(skip(self), fields(provider = "datadog"))]
    async fn monthly_usage_attribution(
        &self,
        start_month: NaiveDate,
        tag_breakdown_keys: &str,
    ) -> Result<Vec<TagAttribution>, UsageApiError> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_ATTRIBUTION_PAGES {
            let query = Self::attribution_query(start_month, tag_breakdown_keys, cursor.as_deref());
            let page: MonthlyUsageAttributionResponse =
                self.get(USAGE_ATTRIBUTION_PATH, &query).await?;
            rows.extend(page.usage.into_iter().map(TagAttribution::from));

            cursor = page
                .metadata
                .as_ref()
                .and_then(|m| m.next_record_id())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
            debug!(next_record_id = ?cursor, "Fetching next usage attribution page");
        }

        Ok(rows)
    }

    #[instrument(skip(self), fields(provider = "datadog"))]
    async fn monthly_cost_attribution(
        &self,
        start_month: NaiveDate,
        tag_breakdown_keys: &str,
    ) -> Result<Vec<TagAttribution>, UsageApiError> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_ATTRIBUTION_PAGES {
            let query = Self::attribution_query(start_month, tag_breakdown_keys, cursor.as_deref());
            let page: MonthlyCostAttributionResponse =
                self.get(COST_ATTRIBUTION_PATH, &query).await?;
            rows.extend(
                page.data
                    .into_iter()
                    .map(|entry| TagAttribution::from(entry.attributes)),
            );

            cursor = page
                .meta
                .as_ref()
                .and_then(|m| m.next_record_id())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
            debug!(next_record_id = ?cursor, "Fetching next cost attribution page");
        }

        Ok(rows)
    }

    #[instrument(skip(self), fields(provider = "datadog"))]
    async fn billable_summary(
        &self,
        month: NaiveDate,
        include_connected_accounts: bool,
    ) -> Result<BillableSummaryResponse, UsageApiError> {
        let query = [
            ("month", Self::format_month(month)),
            (
                "include_connected_accounts",
                include_connected_accounts.to_string(),
            ),
        ];
        self.get(BILLABLE_SUMMARY_PATH, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn may() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    async fn client_for(server: &MockServer) -> DatadogUsageClient {
        let config = DatadogConfig::new("test-api", "test-app")
            .unwrap()
            .with_base_url(&server.uri())
            .unwrap();
        DatadogUsageClient::new(config).unwrap()
    }

    #[test]
    fn test_format_month() {
        assert_eq!(DatadogUsageClient::format_month(may()), "2024-05");
    }

    #[test]
    fn test_attribution_query() {
        let query = DatadogUsageClient::attribution_query(may(), "team,service", Some("next"));
        assert!(query.contains(&("start_month", "2024-05".to_string())));
        assert!(query.contains(&("fields", "*".to_string())));
        assert!(query.contains(&("tag_breakdown_keys", "team,service".to_string())));
        assert!(query.contains(&("next_record_id", "next".to_string())));

        let query = DatadogUsageClient::attribution_query(may(), "", None);
        assert_eq!(query.len(), 2);
    }

    #[tokio::test]
    async fn test_estimated_cost_sends_keys_and_month() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ESTIMATED_COST_PATH))
            .and(query_param("start_month", "2024-05"))
            .and(header("DD-API-KEY", "test-api"))
            .and(header("DD-APPLICATION-KEY", "test-app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "1",
                    "type": "cost_by_org",
                    "attributes": {
                        "org_name": "Acme",
                        "date": "2024-05-01T00:00:00Z",
                        "total_cost": 1234.5,
                        "charges": [
                            { "product_name": "infra_host", "charge_type": "total", "cost": 1000.0 }
                        ]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let costs = client.estimated_cost_by_org(may()).await.unwrap();

        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].org_name, "Acme");
        assert!((costs[0].total_cost - 1234.5).abs() < f64::EPSILON);
        assert_eq!(costs[0].charges[0].product_name, "infra_host");
    }

    #[tokio::test]
    async fn test_billable_summary_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BILLABLE_SUMMARY_PATH))
            .and(query_param("month", "2024-05"))
            .and(query_param("include_connected_accounts", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage": [{
                    "org_name": "Acme",
                    "usage": {
                        "infra_host_top99p": {
                            "account_billable_usage": 120,
                            "usage_unit": "hosts",
                            "billing_dimension": "infra_host"
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let summary = client.billable_summary(may(), true).await.unwrap();

        assert_eq!(summary.usage.len(), 1);
        assert_eq!(summary.usage[0].org_name.as_deref(), Some("Acme"));
        assert!(summary.usage[0].usage.infra_host_top99p.is_some());
    }

    #[tokio::test]
    async fn test_usage_attribution_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(USAGE_ATTRIBUTION_PATH))
            .and(query_param("next_record_id", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage": [{ "org_name": "Beta", "tags": { "team": [] }, "values": {} }],
                "metadata": { "pagination": { "next_record_id": null } }
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(USAGE_ATTRIBUTION_PATH))
            .and(query_param("tag_breakdown_keys", "team"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage": [{ "org_name": "Acme", "tags": { "team": ["core"] }, "values": {} }],
                "metadata": { "pagination": { "next_record_id": "page-2" } }
            })))
            .expect(1)
            .with_priority(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let rows = client.monthly_usage_attribution(may(), "team").await.unwrap();

        let orgs: Vec<_> = rows.iter().map(|r| r.org_name.as_str()).collect();
        assert_eq!(orgs, vec!["Acme", "Beta"]);
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECTED_COST_PATH))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "errors": ["Internal error"] })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.projected_cost(true).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("Internal error"));
    }

    #[tokio::test]
    async fn test_forbidden_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "errors": ["Forbidden"] })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.projected_cost(false).await.unwrap_err();
        assert!(matches!(
            err,
            UsageApiError::Unauthorized { status: 403, ref message } if message == "Forbidden"
        ));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_projected_cost_includes_connected_accounts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECTED_COST_PATH))
            .and(query_param("include_connected_accounts", "true"))
            .and(header("DD-API-KEY", "test-api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "1",
                    "type": "projected_cost",
                    "attributes": {
                        "org_name": "Acme",
                        "public_id": "abc123",
                        "date": "2024-05-17T00:00:00Z",
                        "projected_total_cost": 4321.5
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let projections = client.projected_cost(true).await.unwrap();

        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].org_name, "Acme");
        assert!((projections[0].projected_total_cost - 4321.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cost_attribution_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COST_ATTRIBUTION_PATH))
            .and(query_param("next_record_id", "page-2"))
            .and(query_param("fields", "*"))
            .and(query_param("tag_breakdown_keys", "team"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "type": "cost_by_tag",
                    "attributes": {
                        "org_name": "Beta",
                        "tags": { "team": null },
                        "values": { "logs_total_cost": 5.0 }
                    }
                }],
                "meta": { "pagination": { "next_record_id": null } }
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(COST_ATTRIBUTION_PATH))
            .and(query_param("start_month", "2024-05"))
            .and(query_param("fields", "*"))
            .and(query_param("tag_breakdown_keys", "team"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "type": "cost_by_tag",
                    "attributes": {
                        "org_name": "Acme",
                        "month": "2024-05-01T00:00:00Z",
                        "tags": { "team": ["core"] },
                        "values": { "infra_host_total_cost": 120.0 }
                    }
                }],
                "meta": { "pagination": { "next_record_id": "page-2" } }
            })))
            .expect(1)
            .with_priority(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let rows = client.monthly_cost_attribution(may(), "team").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].org_name, "Acme");
        assert_eq!(rows[0].tags["team"], vec!["core".to_string()]);
        assert!((rows[0].values["infra_host_total_cost"] - 120.0).abs() < f64::EPSILON);
        assert_eq!(rows[1].org_name, "Beta");
        assert!(rows[1].is_untagged());
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.billable_summary(may(), true).await.unwrap_err();
        assert!(matches!(err, UsageApiError::RateLimited(ref m) if m == "slow down"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_serialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.estimated_cost_by_org(may()).await.unwrap_err();
        assert!(matches!(err, UsageApiError::Serialization(_)));
    }
}
