//! Time utilities for rollcall
//!
//! Everything that compares against "now" goes through a [`Clock`], so the
//! registration deadline and lateness rules can be exercised at fixed
//! instants.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time seen by [`SystemClock`]. The mock clock keeps
//! advancing at the real rate from the given instant.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-01-01 08:50:00`)
//!
//! Example:
//! ```bash
//! ROLLCALL_MOCK_TIME="2025-01-01 08:50:00" rollcall attendance check-in ...
//! ```

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};

use crate::{Result, RollcallError};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Calendar date format used on every external surface
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format used on every external surface
pub const TIME_FORMAT: &str = "%H:%M";

/// Cached mock time offset from the real time when the process started.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of "now" for every deadline and lateness comparison
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock backed by [`now()`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// Settable clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Local>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Clock fixed at the given local date and `HH:MM`
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self::new(local_instant(date, time))
    }

    pub fn set(&self, instant: DateTime<Local>) {
        *self.instant.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.instant.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.instant.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| RollcallError::validation(format!("Invalid date '{}', expected YYYY-MM-DD", s)))
}

/// Parse an `HH:MM` time of day
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map_err(|_| RollcallError::validation(format!("Invalid time '{}', expected HH:MM", s)))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Resolve a local date and time of day to an absolute instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// nonexistent ones (DST spring-forward) are read as UTC.
pub fn local_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let naive = date.and_time(time);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Last instant at which registration for a session starting at
/// `date`+`start` is still accepted.
pub fn registration_deadline(
    date: NaiveDate,
    start: NaiveTime,
    lead: chrono::Duration,
) -> DateTime<Local> {
    local_instant(date, start) - lead
}

/// Where a check-in falls relative to a session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuality {
    /// At or before the start
    OnTime,
    /// After the start, within the late window
    Late,
    /// Past the late window
    TooLate,
}

/// Classify `at` against `start` with an inclusive late window
pub fn punctuality(
    at: DateTime<Local>,
    start: DateTime<Local>,
    late_window: chrono::Duration,
) -> Punctuality {
    let delay = at.signed_duration_since(start);
    if delay <= chrono::Duration::zero() {
        Punctuality::OnTime
    } else if delay <= late_window {
        Punctuality::Late
    } else {
        Punctuality::TooLate
    }
}

/// Closed range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(RollcallError::validation(format!(
                "Range start {} is after end {}",
                format_date(start),
                format_date(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering a single day
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days in the range, both ends included
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every day in the range, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        parse_time_of_day(s).unwrap()
    }

    #[test]
    fn test_parse_date_and_time() {
        assert_eq!(date("2025-01-03"), NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(time("09:05"), NaiveTime::from_hms_opt(9, 5, 0).unwrap());

        assert!(parse_date("2025/01/03").is_err());
        assert!(parse_date("").is_err());
        assert!(parse_time_of_day("9am").is_err());
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn test_registration_deadline() {
        let deadline = registration_deadline(date("2025-01-02"), time("09:00"), Duration::hours(2));
        assert_eq!(deadline, local_instant(date("2025-01-02"), time("07:00")));

        // Early sessions push the deadline into the previous day
        let deadline = registration_deadline(date("2025-01-02"), time("01:00"), Duration::hours(2));
        assert_eq!(deadline, local_instant(date("2025-01-01"), time("23:00")));
    }

    #[test]
    fn test_punctuality_boundaries() {
        let day = date("2025-01-01");
        let start = local_instant(day, time("09:00"));
        let window = Duration::minutes(15);

        assert_eq!(punctuality(local_instant(day, time("08:59")), start, window), Punctuality::OnTime);
        assert_eq!(punctuality(start, start, window), Punctuality::OnTime);
        assert_eq!(punctuality(local_instant(day, time("09:10")), start, window), Punctuality::Late);
        assert_eq!(punctuality(local_instant(day, time("09:15")), start, window), Punctuality::Late);
        assert_eq!(punctuality(local_instant(day, time("09:16")), start, window), Punctuality::TooLate);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at(date("2025-01-01"), time("08:00"));
        assert_eq!(clock.today(), date("2025-01-01"));

        clock.advance(Duration::days(1));
        assert_eq!(clock.today(), date("2025-01-02"));

        clock.set(local_instant(date("2025-03-01"), time("12:00")));
        assert_eq!(clock.today(), date("2025-03-01"));
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::parse("2025-01-30", "2025-02-02").unwrap();
        let days: Vec<_> = range.days().collect();

        assert_eq!(range.num_days(), 4);
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], date("2025-01-30"));
        assert_eq!(days[3], date("2025-02-02"));
        assert!(range.contains(date("2025-02-01")));
        assert!(!range.contains(date("2025-02-03")));

        assert_eq!(DateRange::single(date("2025-01-01")).days().count(), 1);
        assert!(DateRange::parse("2025-01-02", "2025-01-01").is_err());
    }

    #[test]
    fn test_now_returns_time() {
        let t = SystemClock.now();
        assert!(t.date_naive() >= date("2020-01-01"));
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "ROLLCALL_MOCK_TIME");
        let example = "2025-12-25 14:30:00";
        assert!(NaiveDateTime::parse_from_str(example, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
