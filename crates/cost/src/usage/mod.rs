//! Billable usage normalization and month-over-month comparison.
//!
//! ## Pipeline
//!
//! ```rust,ignore
//! use pyro_cost::usage::{comparison_rows, normalize, percentage_of_month};
//!
//! let current = normalize(&this_month_response)?;
//! let prior = normalize(&last_month_response)?;
//! let pace = percentage_of_month(today);
//!
//! for row in comparison_rows(&current, &prior, pace) {
//!     println!("{} {}: {:.0}% {:?}", row.organization, row.billing_dimension, row.percent_diff, row.status);
//! }
//! ```

pub mod compare;
pub mod normalize;
pub mod pace;
pub mod record;

pub use compare::{compare, comparison_rows, ComparisonRow, NoBaseline, PaceStatus};
pub use normalize::{classify, normalize, NormalizeError, UsageField};
pub use pace::{days_in_month, percentage_of_month, FixedDate, MonthProgress, SystemClock};
pub use record::{CanonicalUsageRecord, ConflictingRecord, OrgUsage, Snapshot};
