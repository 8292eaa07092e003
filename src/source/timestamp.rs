use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::dispatch::client::RebaseFn;
use crate::source::entry::Metadata;

/// Layout of the `Time:` field in the export, e.g. `Tue Mar  5 07:08:09 2024`.
pub const RECORD_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Record time layout after the leading weekday token.
const RECORD_DATE_FORMAT: &str = "%b %e %H:%M:%S %Y";

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Layout of the configured start time, e.g. `2024-03-05 07:08:09`.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("failed to parse timestamp '{value}' with format '{format}': {source}")]
    ParseError {
        value: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid weekday in '{0}'")]
    InvalidWeekday(String),

    #[error("invalid utc offset '{0}', expected [+-]HH:MM")]
    InvalidOffset(String),

    #[error("metadata has no '{0}' field")]
    MissingField(&'static str),

    #[error("metadata field '{field}' is not an integer: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Parse a record time. The export carries no zone, so the value is taken as UTC.
///
/// The weekday must be an abbreviated day name but is not checked against the
/// date.
pub fn parse_record_time(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    match value.split_once(' ') {
        Some((weekday, rest)) if WEEKDAY_NAMES.contains(&weekday) => {
            parse_naive_utc(rest, RECORD_DATE_FORMAT)
        }
        _ => Err(TimestampError::InvalidWeekday(value.to_string())),
    }
}

/// Parse the configured start time, taken as UTC like record times.
pub fn parse_start_time(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    parse_naive_utc(value, START_TIME_FORMAT)
}

fn parse_naive_utc(value: &str, format: &str) -> Result<DateTime<Utc>, TimestampError> {
    NaiveDateTime::parse_from_str(value, format)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|e| TimestampError::ParseError {
            value: value.to_string(),
            format: format.to_string(),
            source: e,
        })
}

/// Parse an offset of the form `+HH:MM`, `-HH:MM` or `+HH`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, TimestampError> {
    let invalid = || TimestampError::InvalidOffset(value.to_string());

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Offset of the host's local zone right now.
pub fn local_utc_offset() -> FixedOffset {
    Local::now().offset().fix()
}

/// Shift the `unix_nano` metadata field back by `offset`.
///
/// Record times are local wall-clock values parsed as UTC; subtracting the
/// zone offset yields the real instant.
pub fn rebase_unix_nanos(meta: &Metadata, offset: FixedOffset) -> Result<String, TimestampError> {
    let value = meta
        .get("unix_nano")
        .ok_or(TimestampError::MissingField("unix_nano"))?;
    let nanos: i64 = value.parse().map_err(|_| TimestampError::InvalidField {
        field: "unix_nano",
        value: value.clone(),
    })?;
    let shift = i64::from(offset.local_minus_utc()) * 1_000_000_000;
    Ok(nanos.saturating_sub(shift).to_string())
}

/// Build the dispatch hook that stamps each record with its origin time.
pub fn origin_timestamp_rebase(offset: FixedOffset) -> RebaseFn {
    Arc::new(
        move |_line: &str, meta: Option<&Metadata>| -> Result<String, TimestampError> {
            match meta {
                Some(meta) => rebase_unix_nanos(meta, offset),
                None => Err(TimestampError::MissingField("unix_nano")),
            }
        },
    )
}
