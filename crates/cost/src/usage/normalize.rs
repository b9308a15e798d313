//! Normalization of billable summary responses into [`Snapshot`]s.
//!
//! The billable summary API reports each product either as a typed field or,
//! for products the API has not promoted yet, inside an open-ended extension
//! mapping. Which products are typed changes between API releases, so every
//! field is classified by shape first and then lowered into the same
//! [`CanonicalUsageRecord`]. Records are keyed by their own
//! `billing_dimension`, never by the field or extension key they arrived under.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::record::{CanonicalUsageRecord, Snapshot};
use crate::providers::datadog::{BillableSummaryKeys, BillableSummaryResponse};

/// Name reported for fields found in the extension mapping.
const EXTENSION_FIELD: &str = "additional_properties";

/// Errors raised while normalizing a billable summary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// A usage field had an unrecognized shape, a missing required attribute,
    /// or contradicted another field reporting the same billing dimension.
    #[error("malformed usage record for org {org:?} in {field}: {reason}")]
    MalformedRecord {
        org: String,
        field: String,
        reason: String,
    },
}

impl NormalizeError {
    fn malformed(org: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            org: org.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// One usage field, classified by shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UsageField<'a> {
    /// A typed billing dimension record.
    Typed(&'a Map<String, Value>),
    /// The extension mapping: opaque key to attribute bag.
    Extension(&'a Map<String, Value>),
    /// A typed slot holding something other than an attribute object.
    Unrecognized(&'a Value),
    /// Absent or all-zero; contributes nothing.
    Empty,
}

impl<'a> UsageField<'a> {
    fn typed(value: Option<&'a Value>) -> Self {
        match value {
            None => Self::Empty,
            Some(Value::Object(attributes)) if is_blank_bag(attributes) => Self::Empty,
            Some(Value::Object(attributes)) => Self::Typed(attributes),
            Some(other) if is_blank_value(other) => Self::Empty,
            Some(other) => Self::Unrecognized(other),
        }
    }

    fn extension(bag: &'a Map<String, Value>) -> Self {
        if bag.is_empty() {
            Self::Empty
        } else {
            Self::Extension(bag)
        }
    }
}

/// Every field of `keys`, typed fields first (declaration order), then the extension mapping.
pub fn classify(keys: &BillableSummaryKeys) -> Vec<(&'static str, UsageField<'_>)> {
    let mut fields: Vec<_> = keys
        .typed_fields()
        .into_iter()
        .map(|(name, body)| (name, UsageField::typed(body)))
        .collect();
    fields.push((
        EXTENSION_FIELD,
        UsageField::extension(&keys.additional_properties),
    ));
    fields
}

/// Normalize one month's billable summary into a [`Snapshot`].
///
/// Every organization in the response appears in the snapshot, even one whose
/// fields are all empty.
///
/// # Errors
///
/// Returns [`NormalizeError::MalformedRecord`] if any field cannot be lowered
/// into a record, or if two fields report the same dimension for the same
/// organization with different values. Nothing is dropped silently.
pub fn normalize(response: &BillableSummaryResponse) -> Result<Snapshot, NormalizeError> {
    let mut snapshot = Snapshot::new();

    for block in &response.usage {
        let org = block.org_name.as_deref().unwrap_or_default();
        snapshot.ensure_org(org);

        for (field, usage_field) in classify(&block.usage) {
            for (source, attributes) in lower(org, field, usage_field)? {
                let record = attributes.into_record(org, &source)?;
                snapshot.insert(org, record).map_err(|conflict| {
                    NormalizeError::malformed(
                        org,
                        &source,
                        format!(
                            "billing dimension {:?} reported twice with different values",
                            conflict.existing.billing_dimension
                        ),
                    )
                })?;
            }
        }
    }

    debug!(
        orgs = snapshot.len(),
        records = snapshot.record_count(),
        "Normalized billable summary"
    );
    Ok(snapshot)
}

/// Attributes common to both shapes, before validation.
#[derive(Debug, Default, PartialEq)]
struct RawAttributes {
    billing_dimension: Option<String>,
    account_billable_usage: Option<i64>,
    org_billable_usage: Option<i64>,
    elapsed_usage_hours: Option<i64>,
    percentage_in_account: Option<f64>,
    usage_unit: Option<String>,
}

impl RawAttributes {
    #[allow(clippy::cast_possible_truncation)]
    fn from_bag(org: &str, field: &str, bag: &Map<String, Value>) -> Result<Self, NormalizeError> {
        let string = |key: &str| -> Result<Option<String>, NormalizeError> {
            match bag.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(NormalizeError::malformed(
                    org,
                    field,
                    format!("{key} should be a string, found {}", json_kind(other)),
                )),
            }
        };
        let number = |key: &str| -> Result<Option<f64>, NormalizeError> {
            match bag.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Number(n)) => Ok(n.as_f64()),
                Some(other) => Err(NormalizeError::malformed(
                    org,
                    field,
                    format!("{key} should be a number, found {}", json_kind(other)),
                )),
            }
        };
        let integer = |key: &str| -> Result<Option<i64>, NormalizeError> {
            match bag.get(key) {
                Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64()),
                // Whole counts sometimes arrive as floats; truncate them.
                _ => number(key).map(|v| v.map(|f| f as i64)),
            }
        };

        Ok(Self {
            billing_dimension: string("billing_dimension")?,
            account_billable_usage: integer("account_billable_usage")?,
            org_billable_usage: integer("org_billable_usage")?,
            elapsed_usage_hours: integer("elapsed_usage_hours")?,
            percentage_in_account: number("percentage_in_account")?,
            usage_unit: string("usage_unit")?,
        })
    }

    fn into_record(self, org: &str, field: &str) -> Result<CanonicalUsageRecord, NormalizeError> {
        let missing = |attribute: &str| {
            NormalizeError::malformed(org, field, format!("missing required attribute {attribute}"))
        };

        let billing_dimension = self
            .billing_dimension
            .ok_or_else(|| missing("billing_dimension"))?;
        if billing_dimension.trim().is_empty() {
            return Err(NormalizeError::malformed(
                org,
                field,
                "billing_dimension is empty",
            ));
        }

        Ok(CanonicalUsageRecord {
            billing_dimension,
            account_billable_usage: self
                .account_billable_usage
                .ok_or_else(|| missing("account_billable_usage"))?,
            org_billable_usage: self.org_billable_usage.unwrap_or_default(),
            elapsed_usage_hours: self.elapsed_usage_hours.unwrap_or_default(),
            percentage_in_account: self.percentage_in_account.unwrap_or_default(),
            usage_unit: self.usage_unit.ok_or_else(|| missing("usage_unit"))?,
        })
    }
}

/// Lower one classified field into unvalidated attribute sets, each tagged with its source path.
fn lower(
    org: &str,
    field: &'static str,
    usage_field: UsageField<'_>,
) -> Result<Vec<(String, RawAttributes)>, NormalizeError> {
    match usage_field {
        UsageField::Empty => Ok(Vec::new()),
        UsageField::Typed(attributes) => Ok(vec![(
            field.to_string(),
            RawAttributes::from_bag(org, field, attributes)?,
        )]),
        UsageField::Unrecognized(value) => Err(NormalizeError::malformed(
            org,
            field,
            format!("expected an attribute object, found {}", json_kind(value)),
        )),
        UsageField::Extension(bag) => {
            let mut lowered = Vec::with_capacity(bag.len());
            for (key, value) in bag {
                let source = format!("{field}.{key}");
                match value {
                    Value::Object(attributes) if is_blank_bag(attributes) => {}
                    Value::Object(attributes) => {
                        lowered.push((source.clone(), RawAttributes::from_bag(org, &source, attributes)?));
                    }
                    other if is_blank_value(other) => {}
                    other => {
                        return Err(NormalizeError::malformed(
                            org,
                            &source,
                            format!("expected an attribute object, found {}", json_kind(other)),
                        ));
                    }
                }
            }
            Ok(lowered)
        }
    }
}

fn is_blank_bag(bag: &Map<String, Value>) -> bool {
    bag.values().all(is_blank_value)
}

fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
