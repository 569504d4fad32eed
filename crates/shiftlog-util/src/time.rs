//! Wall-clock helpers for shiftlog
//!
//! Shifts are keyed by calendar day, so every "today" and every timestamp
//! goes through [`now`].
//!
//! # Mock Time for Development
//!
//! In debug builds, the `SHIFTLOG_MOCK_TIME` environment variable overrides
//! the system time. Useful for exercising the prior-day resume rule.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 05:30:00`)

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "SHIFTLOG_MOCK_TIME";

/// Format accepted in [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time at process start.
/// Mock time advances at the real rate.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match parse_mock_time(&mock_time_str) {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time"
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

fn parse_mock_time(value: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value, MOCK_TIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current local time, respecting mock time in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Calendar day a shift started now belongs to.
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// `HH:MM`, the form drivers and the office sheet use for shift times.
pub fn format_clock_time(dt: &DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// `YYYY-MM-DD`, the date column format of the office sheet.
pub fn format_date(day: &NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Full date and time, for logs and CLI output.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
