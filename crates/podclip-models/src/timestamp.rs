//! Timestamp formatting for API responses.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a UTC timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Sub-second precision is dropped so the wire format is stable regardless
/// of how the row was produced.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use podclip_models::timestamp::format_utc_second;
/// let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 5).unwrap();
/// assert_eq!(format_utc_second(&ts), "2025-06-01T12:30:05Z");
/// ```
pub fn format_utc_second(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
