//! How far through the calendar month we are.

use chrono::{Datelike, Months, NaiveDate, Utc};

/// Number of days in the month containing `date`, leap years included.
///
/// Computed as the day before the first of the following month.
#[must_use]
pub fn days_in_month(date: NaiveDate) -> u32 {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        // Only the last representable December has no following month.
        .map_or(31, |last| last.day())
}

/// Percentage of the month elapsed on `date`, `day * 100 / days_in_month`, truncated.
///
/// The last day of any month is 100.
#[must_use]
pub fn percentage_of_month(date: NaiveDate) -> u32 {
    date.day() * 100 / days_in_month(date)
}

/// Source of "today" for pace calculations.
pub trait MonthProgress: Send + Sync {
    /// The current date.
    fn today(&self) -> NaiveDate;

    /// Percentage of the current month elapsed, 0 to 100.
    fn percentage_of_month(&self) -> u32 {
        percentage_of_month(self.today())
    }
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MonthProgress for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock frozen on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDate(pub NaiveDate);

impl MonthProgress for FixedDate {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
