//! Calendar arithmetic shared by every cycle and window computation.
//!
//! All dates are `NaiveDate`: comparisons never look at time-of-day or
//! timezones, and intervals are half-open `[start, end)`.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::error::{Result, TrackerError};

/// Drops the time-of-day component.
pub fn start_of_day(moment: NaiveDateTime) -> NaiveDate {
    moment.date()
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in a month (1-based month).
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 31,
    }
}

/// Clamps `day` to the length of the given month, so a fixed day-of-month
/// (e.g. a fee due on the 31st) can be projected onto any month.
pub fn safe_day(year: i32, month: u32, day: u32) -> u32 {
    day.max(1).min(days_in_month(year, month))
}

/// Builds a date from year/month/day, clamping the day to the month length.
/// Months outside 1..=12 are normalised with a year carry.
pub fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let (year, month) = normalize_month(year, month as i32 - 1);
    let day = safe_day(year, month, day);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Adds `months` to `date`, keeping the day-of-month where the target month
/// allows it and clamping otherwise.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let index = date.month0() as i32 + months;
    let (year, month) = normalize_month(date.year(), index);
    let day = safe_day(year, month, date.day());
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

/// Turns a zero-based month index relative to `year` into a (year, 1-based month) pair.
fn normalize_month(year: i32, month_index: i32) -> (i32, u32) {
    let month0 = month_index.rem_euclid(12);
    let carry = month_index.div_euclid(12);
    (year + carry, month0 as u32 + 1)
}

/// Parses an ISO `YYYY-MM-DD` date. A full datetime (`YYYY-MM-DDTHH:MM:SS`,
/// optionally with fractional seconds or an offset) is accepted and truncated
/// to its calendar date without any timezone shift.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    // The calendar date is the first ten characters of any ISO datetime.
    match (trimmed.get(..10), trimmed.get(10..11)) {
        (Some(head), Some("T" | " ")) => NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .map_err(|_| TrackerError::InvalidDate(value.to_string())),
        _ => Err(TrackerError::InvalidDate(value.to_string())),
    }
}

/// Like [`parse_date`], but logs and returns `None` on malformed input.
pub fn parse_date_lenient(value: &str) -> Option<NaiveDate> {
    match parse_date(value) {
        Ok(date) => Some(date),
        Err(err) => {
            warn!(%err, "ignoring malformed stored date");
            None
        }
    }
}

pub fn format_date_input(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Half-open containment: `start <= date < end`.
pub fn is_within_range(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    start <= date && date < end
}

/// Human-readable inclusive range for an exclusive-end interval,
/// e.g. `Jan 1, 2024 - Jan 31, 2024`.
pub fn format_date_range(start: NaiveDate, end_exclusive: NaiveDate) -> String {
    let last = end_exclusive.pred_opt().unwrap_or(end_exclusive).max(start);
    format!("{} - {}", start.format("%b %-d, %Y"), last.format("%b %-d, %Y"))
}
