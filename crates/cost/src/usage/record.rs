//! Canonical billable usage records and per-month snapshots.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Billable usage of one organization, for one billing dimension, for one month.
///
/// Produced by the normalizer regardless of whether the dimension arrived as a
/// typed field or through the extension mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalUsageRecord {
    /// Stable identifier of the usage category (e.g. `infra_host`).
    pub billing_dimension: String,
    /// Usage billed at the parent account level.
    pub account_billable_usage: i64,
    /// Usage billed to the organization itself.
    pub org_billable_usage: i64,
    /// Hours elapsed in the billing period covered by this record.
    pub elapsed_usage_hours: i64,
    /// The organization's share of account usage for this dimension, 0 to 100.
    pub percentage_in_account: f64,
    /// Display unit (e.g. `hosts`, `GB`).
    pub usage_unit: String,
}

/// Dimensions of one organization, keyed by billing dimension.
pub type OrgUsage = BTreeMap<String, CanonicalUsageRecord>;

/// Normalized billable usage for one month: organization to billing dimension to record.
///
/// Both levels are ordered, so iteration is deterministic and an organization's
/// dimensions are always visited together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    orgs: BTreeMap<String, OrgUsage>,
}

/// Returned by [`Snapshot::insert`] when a dimension is already present with different values.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictingRecord {
    /// Record already stored for the dimension.
    pub existing: CanonicalUsageRecord,
    /// Record that was rejected.
    pub rejected: CanonicalUsageRecord,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `org` is present, even if it ends up with no dimensions.
    pub fn ensure_org(&mut self, org: &str) {
        if !self.orgs.contains_key(org) {
            self.orgs.insert(org.to_string(), OrgUsage::new());
        }
    }

    /// Add a record for `org`.
    ///
    /// A record equal to the one already stored for its dimension is absorbed.
    ///
    /// # Errors
    ///
    /// Returns the conflicting pair if the dimension is already present with
    /// different values; the snapshot is left unchanged.
    pub fn insert(
        &mut self,
        org: &str,
        record: CanonicalUsageRecord,
    ) -> Result<(), Box<ConflictingRecord>> {
        let dimensions = self.orgs.entry(org.to_string()).or_default();
        match dimensions.entry(record.billing_dimension.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
            Entry::Occupied(slot) if *slot.get() == record => Ok(()),
            Entry::Occupied(slot) => Err(Box::new(ConflictingRecord {
                existing: slot.get().clone(),
                rejected: record,
            })),
        }
    }

    /// Record for `org` and `billing_dimension`.
    #[must_use]
    pub fn get(&self, org: &str, billing_dimension: &str) -> Option<&CanonicalUsageRecord> {
        self.orgs.get(org)?.get(billing_dimension)
    }

    /// All dimensions of `org`.
    #[must_use]
    pub fn org(&self, org: &str) -> Option<&OrgUsage> {
        self.orgs.get(org)
    }

    /// Iterate organizations in name order.
    pub fn orgs(&self) -> btree_map::Iter<'_, String, OrgUsage> {
        self.orgs.iter()
    }

    /// Number of organizations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orgs.len()
    }

    /// Whether the snapshot has no organizations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orgs.is_empty()
    }

    /// Total number of records across organizations.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.orgs.values().map(BTreeMap::len).sum()
    }
}
