//! Date windows used to scope a competitor's result history.
//!
//! A window is the half-open interval `(start, end]`: competitions held on the
//! start instant itself are excluded, competitions on the end instant are kept.
//! Competition dates carry no time of day and are read as midnight UTC.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Length of a month in the legacy "months back" window form.
const LEGACY_MONTH_DAYS: i64 = 31;

/// A date window `(start, end]` over competition dates.
///
/// # Examples
///
/// ```
/// use cube_odds::DateWindow;
/// use chrono::{Duration, Utc};
///
/// let window = DateWindow::until_now(Utc::now() - Duration::days(30)).unwrap();
/// assert!(window.contains_date(Utc::now().date_naive() - Duration::days(2)));
/// assert!(!window.contains_date(Utc::now().date_naive() - Duration::days(60)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    /// Exclusive lower bound.
    pub start: DateTime<Utc>,

    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Creates a window from two instants.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidWindow` if `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a window from `start` up to now.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::WindowStartNotInPast` if `start` is not before now.
    pub fn until_now(start: DateTime<Utc>) -> Result<Self, ValidationError> {
        let now = Utc::now();
        if start >= now {
            return Err(ValidationError::WindowStartNotInPast { start });
        }
        Ok(Self { start, end: now })
    }

    /// Legacy form: `months` thirty-one day months back from now.
    #[must_use]
    pub fn months_back(months: u32) -> Self {
        let end = Utc::now();
        let months = i64::from(months.max(1));
        Self {
            start: end - Duration::days(months * LEGACY_MONTH_DAYS),
            end,
        }
    }

    /// The calendar year ending now.
    #[must_use]
    pub fn trailing_year() -> Self {
        let end = Utc::now();
        let start = end
            .checked_sub_months(Months::new(12))
            .unwrap_or(end - Duration::days(365));
        Self { start, end }
    }

    /// Calendar years touched by this window, used to pick competition listings.
    #[must_use]
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }

    /// Returns true if a competition held on `date` falls inside the window.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        let at = date.and_time(chrono::NaiveTime::MIN).and_utc();
        at > self.start && at <= self.end
    }

    /// Whole days between `date` and the end of the window (never negative).
    #[must_use]
    pub fn days_before_end(&self, date: NaiveDate) -> i64 {
        (self.end.date_naive() - date).num_days().max(0)
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::trailing_year()
    }
}

/// Parses an upstream `YYYY-MM-DD` competition date.
#[must_use]
pub fn parse_competition_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn new_rejects_inverted_window() {
        let err = DateWindow::new(utc(2024, 5, 1), utc(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidWindow { .. }));
    }

    #[test]
    fn until_now_rejects_future_start() {
        let err = DateWindow::until_now(Utc::now() + Duration::days(1)).unwrap_err();
        assert!(matches!(err, ValidationError::WindowStartNotInPast { .. }));
    }

    #[test]
    fn start_is_exclusive_and_end_inclusive() {
        let window = DateWindow::new(utc(2024, 1, 10), utc(2024, 3, 1)).unwrap();
        let day = |d: &str| parse_competition_date(d).unwrap();

        assert!(!window.contains_date(day("2024-01-10")));
        assert!(window.contains_date(day("2024-01-11")));
        assert!(window.contains_date(day("2024-03-01")));
        assert!(!window.contains_date(day("2024-03-02")));
    }

    #[test]
    fn years_span_the_window() {
        let window = DateWindow::new(utc(2022, 11, 1), utc(2024, 2, 1)).unwrap();
        assert_eq!(window.years().collect::<Vec<_>>(), vec![2022, 2023, 2024]);
    }

    #[test]
    fn months_back_uses_thirty_one_day_months() {
        let window = DateWindow::months_back(2);
        assert_eq!((window.end - window.start).num_days(), 62);
    }

    #[test]
    fn parse_competition_date_rejects_garbage() {
        assert!(parse_competition_date("2024-02-30").is_none());
        assert!(parse_competition_date("soon").is_none());
        assert_eq!(
            parse_competition_date("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn days_before_end_clamps_at_zero() {
        let window = DateWindow::new(utc(2024, 1, 1), utc(2024, 1, 31)).unwrap();
        assert_eq!(window.days_before_end(NaiveDate::from_ymd_opt(2024, 1, 21).unwrap()), 10);
        assert_eq!(window.days_before_end(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()), 0);
    }
}
