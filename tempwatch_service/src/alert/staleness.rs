//! Reading staleness detection.
//!
//! Observing stations report every 20-60 minutes and occasionally go quiet
//! for hours. A reading that old says nothing about the temperature now, so
//! the engine treats it the same as no reading at all.
//!
//! # Clock injection
//! All functions accept a `now: DateTime<Utc>` parameter rather than calling
//! `Utc::now()` internally, which keeps staleness deterministic in tests.

use chrono::{DateTime, Utc};

use crate::model::{Reading, SourceError};

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Age of the reading in whole minutes. Negative when the upstream clock
/// is ahead of ours.
pub fn age_minutes_at(reading: &Reading, now: DateTime<Utc>) -> i64 {
    (now - reading.observed_at).num_minutes()
}

/// Returns `true` if the reading is older than `max_age_minutes`.
///
/// Staleness is strictly greater than the limit:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_stale_at(reading: &Reading, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let age = age_minutes_at(reading, now);
    age > 0 && age as u64 > max_age_minutes
}

/// Passes a fresh reading through, or turns a stale one into
/// `SourceError::StaleData` for `location`.
pub fn ensure_fresh_at(
    reading: Reading,
    location: &str,
    max_age_minutes: u64,
    now: DateTime<Utc>,
) -> Result<Reading, SourceError> {
    if is_stale_at(&reading, max_age_minutes, now) {
        return Err(SourceError::StaleData {
            location: location.to_string(),
            age_minutes: age_minutes_at(&reading, now),
        });
    }
    Ok(reading)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
