//! Datadog usage metering API response models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::providers::{Charge, OrgCost, ProjectedCost, TagAttribution};

// ============================================================================
// v2 estimated / projected cost
// ============================================================================

/// Response from `GET /api/v2/usage/estimated_cost`.
#[derive(Debug, Clone, Deserialize)]
pub struct CostByOrgResponse {
    /// One entry per organization.
    #[serde(default)]
    pub data: Vec<CostByOrg>,
}

/// Cost entry for one organization.
#[derive(Debug, Clone, Deserialize)]
pub struct CostByOrg {
    /// Entry ID.
    pub id: Option<String>,
    /// Cost attributes.
    pub attributes: CostByOrgAttributes,
}

/// Attributes of a [`CostByOrg`] entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CostByOrgAttributes {
    /// Organization name.
    pub org_name: Option<String>,
    /// Organization public ID.
    pub public_id: Option<String>,
    /// Month the cost covers.
    pub date: Option<DateTime<Utc>>,
    /// Total cost in USD.
    pub total_cost: Option<f64>,
    /// Chargeback breakdown.
    #[serde(default)]
    pub charges: Vec<ChargebackBreakdown>,
}

/// One chargeback line.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargebackBreakdown {
    /// Charge type: committed, on_demand or total.
    pub charge_type: Option<String>,
    /// Cost in USD.
    pub cost: Option<f64>,
    /// Product name.
    pub product_name: Option<String>,
}

impl From<CostByOrg> for OrgCost {
    fn from(entry: CostByOrg) -> Self {
        let attributes = entry.attributes;
        Self {
            org_name: attributes.org_name.unwrap_or_default(),
            date: attributes.date.unwrap_or_default(),
            total_cost: attributes.total_cost.unwrap_or_default(),
            charges: attributes
                .charges
                .into_iter()
                .map(|charge| Charge {
                    product_name: charge.product_name.unwrap_or_default(),
                    charge_type: charge.charge_type.unwrap_or_default(),
                    cost: charge.cost.unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Response from `GET /api/v2/usage/projected_cost`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectedCostResponse {
    /// One entry per organization.
    #[serde(default)]
    pub data: Vec<ProjectedCostEntry>,
}

/// Projected cost entry for one organization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectedCostEntry {
    /// Entry ID.
    pub id: Option<String>,
    /// Projection attributes.
    pub attributes: ProjectedCostAttributes,
}

/// Attributes of a [`ProjectedCostEntry`].
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectedCostAttributes {
    /// Organization name.
    pub org_name: Option<String>,
    /// Organization public ID.
    pub public_id: Option<String>,
    /// Date of the projection.
    pub date: Option<DateTime<Utc>>,
    /// Projected total cost in USD.
    pub projected_total_cost: Option<f64>,
}

impl From<ProjectedCostEntry> for ProjectedCost {
    fn from(entry: ProjectedCostEntry) -> Self {
        let attributes = entry.attributes;
        Self {
            org_name: attributes.org_name.unwrap_or_default(),
            date: attributes.date.unwrap_or_default(),
            projected_total_cost: attributes.projected_total_cost.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Attribution (v1 usage, v2 cost)
// ============================================================================

/// Response from `GET /api/v1/usage/monthly-attribution`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyUsageAttributionResponse {
    /// Attribution rows.
    #[serde(default)]
    pub usage: Vec<AttributionBody>,
    /// Pagination metadata.
    pub metadata: Option<AttributionMetadata>,
}

/// Response from `GET /api/v2/cost_by_tag/monthly_cost_attribution`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyCostAttributionResponse {
    /// Attribution rows.
    #[serde(default)]
    pub data: Vec<CostAttributionEntry>,
    /// Pagination metadata.
    pub meta: Option<AttributionMetadata>,
}

/// Cost attribution entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CostAttributionEntry {
    /// Attribution attributes.
    pub attributes: AttributionBody,
}

/// A single attribution row shared by the usage and cost endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionBody {
    /// Organization name.
    pub org_name: Option<String>,
    /// Month covered by the row.
    pub month: Option<DateTime<Utc>>,
    /// Organization public ID.
    pub public_id: Option<String>,
    /// Tag key to attributed values; `null` means the key was not present.
    #[serde(default)]
    pub tags: Option<BTreeMap<String, Option<Vec<String>>>>,
    /// Metric name to value.
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl From<AttributionBody> for TagAttribution {
    fn from(body: AttributionBody) -> Self {
        Self {
            org_name: body.org_name.unwrap_or_default(),
            month: body.month,
            tags: body
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|(key, values)| (key, values.unwrap_or_default()))
                .collect(),
            values: body
                .values
                .into_iter()
                .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
                .collect(),
        }
    }
}

/// Attribution pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributionMetadata {
    /// Pagination cursor.
    pub pagination: Option<AttributionPagination>,
}

/// Cursor for the next attribution page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributionPagination {
    /// Record ID to pass as `next_record_id`; absent on the last page.
    pub next_record_id: Option<String>,
}

impl AttributionMetadata {
    /// Cursor for the following page, if any.
    #[must_use]
    pub fn next_record_id(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_record_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

// ============================================================================
// v1 billable summary
// ============================================================================

/// Response from `GET /api/v1/usage/billable-summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillableSummaryResponse {
    /// One block per organization (and per connected account).
    #[serde(default)]
    pub usage: Vec<BillableSummaryHour>,
}

/// Billable usage of one organization for one month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillableSummaryHour {
    /// Organization name.
    pub org_name: Option<String>,
    /// Organization public ID.
    pub public_id: Option<String>,
    /// Billing plan.
    pub billing_plan: Option<String>,
    /// Share of the parent account's usage.
    pub ratio_in_account: Option<f64>,
    /// Region of the organization.
    pub region: Option<String>,
    /// First hour of the summary period.
    pub start_date: Option<DateTime<Utc>>,
    /// Last hour of the summary period.
    pub end_date: Option<DateTime<Utc>>,
    /// Usage fields.
    #[serde(default)]
    pub usage: BillableSummaryKeys,
}

macro_rules! billable_summary_keys {
    ($($field:ident),+ $(,)?) => {
        /// Billable usage fields of one organization.
        ///
        /// Products the API has promoted to named fields land in the typed
        /// slots; everything else lands in `additional_properties`, keyed by
        /// an opaque extension key. Which products are typed varies from one
        /// API release to the next.
        ///
        /// Slots hold the raw JSON value. Its shape and attribute types are
        /// checked during normalization, the same way for both kinds of field,
        /// so an odd value in one slot never fails the whole response.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct BillableSummaryKeys {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<Value>,
            )+
            /// Untyped products: extension key to attribute bag.
            #[serde(flatten)]
            pub additional_properties: Map<String, Value>,
        }

        impl BillableSummaryKeys {
            /// Typed fields in declaration order, paired with their wire names.
            #[must_use]
            pub fn typed_fields(&self) -> Vec<(&'static str, Option<&Value>)> {
                vec![$((stringify!($field), self.$field.as_ref())),+]
            }
        }
    };
}

billable_summary_keys!(
    apm_fargate_average,
    apm_fargate_sum,
    apm_host_sum,
    apm_host_top99p,
    apm_profiler_host_sum,
    apm_profiler_host_top99p,
    apm_trace_search_sum,
    application_security_host_sum,
    ci_pipeline_indexed_spans_sum,
    ci_pipeline_maximum,
    ci_pipeline_sum,
    ci_testing_maximum,
    ci_testing_sum,
    cspm_container_sum,
    cspm_host_sum,
    custom_event_sum,
    cws_container_sum,
    cws_host_sum,
    dbm_host_sum,
    dbm_queries_sum,
    fargate_container_average,
    fargate_container_sum,
    incident_management_maximum,
    incident_management_sum,
    infra_and_apm_host_sum,
    infra_and_apm_host_top99p,
    infra_container_sum,
    infra_host_sum,
    infra_host_top99p,
    ingested_spans_sum,
    ingested_timeseries_average,
    ingested_timeseries_sum,
    iot_sum,
    iot_top99p,
    lambda_function_average,
    lambda_function_sum,
    logs_forwarding_sum,
    logs_indexed_15day_sum,
    logs_indexed_30day_sum,
    logs_indexed_7day_sum,
    logs_indexed_sum,
    logs_ingested_sum,
    network_device_sum,
    npm_host_sum,
    observability_pipeline_sum,
    online_archive_sum,
    prof_container_sum,
    prof_host_sum,
    rum_lite_sum,
    rum_replay_sum,
    rum_sum,
    rum_units_sum,
    sensitive_data_scanner_sum,
    serverless_apm_sum,
    serverless_infra_average,
    serverless_infra_sum,
    serverless_invocation_sum,
    siem_sum,
    standard_timeseries_average,
    synthetics_api_tests_sum,
    synthetics_app_testing_maximum,
    synthetics_browser_checks_sum,
    timeseries_average,
    timeseries_sum,
);

// ============================================================================
// Error response
// ============================================================================

/// Error response from the Datadog API.
#[derive(Debug, Clone, Deserialize)]
pub struct DatadogError {
    /// Error messages.
    #[serde(default)]
    pub errors: Vec<String>,
}
