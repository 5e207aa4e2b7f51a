//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Whether two currency amounts are equal once rounded to whole cents.
///
/// Stays in `f64` so amounts beyond the `i64` range still compare.
#[allow(clippy::float_cmp)]
pub fn same_cents(left: f64, right: f64) -> bool {
    (left * 100.0).round() == (right * 100.0).round()
}

/// Truncate an instant to the microsecond resolution used by storage.
pub fn storage_precision(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(6)
}

/// Encode an instant as Unix microseconds.
pub fn to_micros(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_micros()
}

/// Decode Unix microseconds into an instant.
pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Database(format!("timestamp out of range: {micros}")))
}
