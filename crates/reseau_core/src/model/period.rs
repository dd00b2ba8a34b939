//! Calendar periods and instant helpers.
//!
//! # Responsibility
//! - Map calendar months/years to UTC epoch-millisecond boundaries.
//! - Parse `YYYY-MM` period keys exchanged with the reporting layer.
//!
//! # Invariants
//! - `YearMonth::last_instant_ms()` is exactly one millisecond before the
//!   first instant of the following month.
//! - Supported years are `SUPPORTED_YEARS`; anything else is rejected.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Years accepted by period arithmetic and comparisons.
pub const SUPPORTED_YEARS: RangeInclusive<i32> = 1900..=9999;

static YEAR_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4})-(\d{1,2})\s*$").expect("valid year-month regex"));

/// Errors from period construction or parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// Input does not look like `YYYY-MM`.
    Malformed(String),
    /// Month outside `1..=12`.
    InvalidMonth(u32),
    /// Year outside `SUPPORTED_YEARS`.
    YearOutOfRange(i32),
    /// Instant cannot be represented as a UTC date.
    InstantOutOfRange(i64),
}

impl Display for PeriodError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "malformed period `{value}`, expected YYYY-MM"),
            Self::InvalidMonth(month) => write!(f, "invalid month {month}"),
            Self::YearOutOfRange(year) => write!(
                f,
                "year {year} outside supported range {}..={}",
                SUPPORTED_YEARS.start(),
                SUPPORTED_YEARS.end()
            ),
            Self::InstantOutOfRange(ms) => write!(f, "instant {ms} is not a valid UTC date"),
        }
    }
}

impl Error for PeriodError {}

/// Calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(month));
        }
        ensure_supported_year(year)?;
        Ok(Self { year, month })
    }

    /// Month containing `instant_ms`.
    pub fn containing(instant_ms: i64) -> Result<Self, PeriodError> {
        let datetime = Utc
            .timestamp_millis_opt(instant_ms)
            .single()
            .ok_or(PeriodError::InstantOutOfRange(instant_ms))?;
        Self::new(datetime.year(), datetime.month())
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Following month; fails past the last supported year.
    pub fn next(self) -> Result<Self, PeriodError> {
        Self::from_month_index(self.month_index() + 1)
    }

    /// Preceding month; fails before the first supported year.
    pub fn previous(self) -> Result<Self, PeriodError> {
        Self::from_month_index(self.month_index() - 1)
    }

    /// First millisecond of the month (00:00:00.000 on day 1, UTC).
    pub fn first_instant_ms(self) -> Result<i64, PeriodError> {
        month_start_ms(self.year, self.month)
    }

    /// Last millisecond of the month (23:59:59.999 on the last day, UTC).
    pub fn last_instant_ms(self) -> Result<i64, PeriodError> {
        let (year, month) = split_month_index(self.month_index() + 1);
        Ok(month_start_ms(year, month)? - 1)
    }

    /// Parses `YYYY-MM` (a single-digit month is accepted).
    pub fn parse(value: &str) -> Result<Self, PeriodError> {
        let captures = YEAR_MONTH_RE
            .captures(value)
            .ok_or_else(|| PeriodError::Malformed(value.to_string()))?;
        let year = captures[1]
            .parse::<i32>()
            .map_err(|_| PeriodError::Malformed(value.to_string()))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|_| PeriodError::Malformed(value.to_string()))?;
        Self::new(year, month)
    }

    /// The `count` months ending with `self`, oldest first.
    ///
    /// Fails when the window would start before `SUPPORTED_YEARS`.
    pub fn window_ending_at(self, count: u32) -> Result<Vec<Self>, PeriodError> {
        let Some(back) = count.checked_sub(1) else {
            return Ok(Vec::new());
        };
        let oldest = Self::from_month_index(self.month_index() - i64::from(back))?;
        let mut months = Vec::with_capacity(count as usize);
        let mut cursor = oldest;
        months.push(cursor);
        while cursor != self {
            cursor = cursor.next()?;
            months.push(cursor);
        }
        Ok(months)
    }

    fn month_index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_month_index(index: i64) -> Result<Self, PeriodError> {
        let (year, month) = split_month_index(index);
        Self::new(year, month)
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Last millisecond of `year` (Dec 31 23:59:59.999 UTC).
pub fn year_last_instant_ms(year: i32) -> Result<i64, PeriodError> {
    ensure_supported_year(year)?;
    Ok(month_start_ms(year + 1, 1)? - 1)
}

/// Calendar year containing `instant_ms`.
pub fn year_containing(instant_ms: i64) -> Result<i32, PeriodError> {
    YearMonth::containing(instant_ms).map(YearMonth::year)
}

/// Current wall-clock instant in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Rejects instants that do not map to a supported calendar date.
pub fn validate_instant(instant_ms: i64) -> Result<i64, PeriodError> {
    YearMonth::containing(instant_ms).map(|_| instant_ms)
}

/// Splits a month index into `(year, month)`, saturating the year to `i32`.
fn split_month_index(index: i64) -> (i32, u32) {
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    let year = i32::try_from(year).unwrap_or(if year < 0 { i32::MIN } else { i32::MAX });
    (year, month)
}

fn ensure_supported_year(year: i32) -> Result<(), PeriodError> {
    if SUPPORTED_YEARS.contains(&year) {
        Ok(())
    } else {
        Err(PeriodError::YearOutOfRange(year))
    }
}

fn month_start_ms(year: i32, month: u32) -> Result<i64, PeriodError> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or(PeriodError::YearOutOfRange(year))?;
    Ok(Utc.from_utc_datetime(&naive).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::{year_last_instant_ms, PeriodError, YearMonth};
    use chrono::{TimeZone, Utc};

    #[test]
    fn last_instant_is_one_ms_before_next_month() {
        let feb = YearMonth::new(2024, 2).unwrap();
        let march_first = Utc
            .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(feb.last_instant_ms().unwrap(), march_first - 1);
    }

    #[test]
    fn december_rolls_into_next_year() {
        let december = YearMonth::new(2024, 12).unwrap();
        assert_eq!(december.next().unwrap(), YearMonth::new(2025, 1).unwrap());
        assert_eq!(
            december.last_instant_ms().unwrap(),
            year_last_instant_ms(2024).unwrap()
        );
    }

    #[test]
    fn window_is_contiguous_and_oldest_first() {
        let july = YearMonth::new(2025, 7).unwrap();
        let window = july.window_ending_at(12).unwrap();
        assert_eq!(window.len(), 12);
        assert_eq!(window[0], YearMonth::new(2024, 8).unwrap());
        assert_eq!(window[11], july);
        for pair in window.windows(2) {
            assert_eq!(pair[0].next().unwrap(), pair[1]);
        }
    }

    #[test]
    fn parse_accepts_year_month_and_rejects_garbage() {
        assert_eq!(
            YearMonth::parse("2024-03").unwrap(),
            YearMonth::new(2024, 3).unwrap()
        );
        assert_eq!(YearMonth::parse(" 2024-3 ").unwrap().to_string(), "2024-03");
        assert_eq!(
            YearMonth::parse("2024-13").unwrap_err(),
            PeriodError::InvalidMonth(13)
        );
        assert!(matches!(
            YearMonth::parse("march 2024"),
            Err(PeriodError::Malformed(_))
        ));
    }

    #[test]
    fn containing_maps_instant_to_its_month() {
        let instant = Utc
            .with_ymd_and_hms(2025, 7, 31, 23, 59, 59)
            .unwrap()
            .timestamp_millis();
        assert_eq!(
            YearMonth::containing(instant).unwrap(),
            YearMonth::new(2025, 7).unwrap()
        );
    }

    #[test]
    fn serializes_as_period_key() {
        let period = YearMonth::new(2024, 8).unwrap();
        assert_eq!(serde_json::to_string(&period).unwrap(), "\"2024-08\"");
    }

    #[test]
    fn stepping_never_leaves_the_supported_years() {
        let first = YearMonth::new(1900, 1).unwrap();
        assert_eq!(first.previous().unwrap_err(), PeriodError::YearOutOfRange(1899));
        let last = YearMonth::new(9999, 12).unwrap();
        assert_eq!(last.next().unwrap_err(), PeriodError::YearOutOfRange(10000));
        assert!(last.last_instant_ms().is_ok());
        assert_eq!(
            YearMonth::new(2024, 1).unwrap().previous().unwrap(),
            YearMonth::new(2023, 12).unwrap()
        );
    }

    #[test]
    fn window_reaching_before_supported_years_is_rejected() {
        let march = YearMonth::new(1900, 3).unwrap();
        assert_eq!(march.window_ending_at(3).unwrap().len(), 3);
        assert_eq!(
            march.window_ending_at(4).unwrap_err(),
            PeriodError::YearOutOfRange(1899)
        );
        assert!(march.window_ending_at(u32::MAX).is_err());
        assert!(march.window_ending_at(0).unwrap().is_empty());
    }
}
