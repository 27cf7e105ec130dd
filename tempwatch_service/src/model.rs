//! Core data types for the temperature alert service.
//!
//! This module defines the shared domain model imported by all other modules:
//! chat identifiers, thresholds, readings, locations, and the error raised by
//! temperature sources. It contains no I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a destination chat. Telegram chat ids are signed
/// 64-bit integers (group chats are negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Lowest and highest threshold a user may set, in °C.
pub const MIN_THRESHOLD_C: f64 = -100.0;
pub const MAX_THRESHOLD_C: f64 = 100.0;

/// A temperature threshold in Celsius, stored in tenths of a degree.
///
/// Storing tenths gives thresholds a total order and exact equality, so a
/// watch set can be keyed and deduplicated by value: `25`, `25.0` and
/// `25.04` are all the same threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(i32);

impl Threshold {
    /// Rounds `celsius` to the nearest tenth. Returns `None` for NaN,
    /// infinities and values outside `MIN_THRESHOLD_C..=MAX_THRESHOLD_C`.
    pub fn from_celsius(celsius: f64) -> Option<Self> {
        if !celsius.is_finite() || !(MIN_THRESHOLD_C..=MAX_THRESHOLD_C).contains(&celsius) {
            return None;
        }
        Some(Threshold((celsius * 10.0).round() as i32))
    }

    pub fn celsius(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// A reading at or above the threshold is a crossing.
    pub fn is_crossed_by(self, reading_c: f64) -> bool {
        self.celsius() <= reading_c
    }

    /// `threshold - margin_c`, with the margin rounded to tenths and the
    /// subtraction done in tenths. `25.2 - 5.0` is exactly the value a
    /// reading of `20.2` parses to.
    pub fn rearm_point(self, margin_c: f64) -> f64 {
        let margin_tenths = (margin_c * 10.0).round() as i32;
        f64::from(self.0 - margin_tenths) / 10.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.celsius())
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// The latest ambient temperature known for a location.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub celsius: f64,
    /// When the upstream observed the value, not when we fetched it.
    pub observed_at: DateTime<Utc>,
}

/// Forecast daily maxima for today and tomorrow, in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastHigh {
    pub today: f64,
    pub tomorrow: f64,
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// How a temperature source addresses a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationQuery {
    /// WGS84 coordinates, used by gridded forecast providers.
    Coordinates { latitude: f64, longitude: f64 },
    /// An observing station id such as an ASOS identifier ("PIA").
    Station { station_id: String },
}

/// A resolved location bound to a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Human-readable label used in messages, e.g. "Peoria, Illinois".
    pub name: String,
    pub query: LocationQuery,
}

impl Location {
    pub fn coordinates(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Location {
            name: name.into(),
            query: LocationQuery::Coordinates { latitude, longitude },
        }
    }

    pub fn station(name: impl Into<String>, station_id: impl Into<String>) -> Self {
        Location {
            name: name.into(),
            query: LocationQuery::Station {
                station_id: station_id.into(),
            },
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when querying a temperature source or geocoder.
///
/// All of these are the "source unavailable" class: a tick that hits one is
/// skipped and logged, never surfaced to the chat.
#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    /// Non-2xx HTTP response from the provider.
    #[error("HTTP error: {0}")]
    HttpError(u16),
    /// Connection failure or timeout.
    #[error("Network error: {0}")]
    Network(String),
    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    ParseError(String),
    /// The provider answered but had no usable value for the location.
    #[error("No data available for {0}")]
    NoDataAvailable(String),
    /// A reading exists but is older than the configured freshness limit.
    #[error("Stale data for {location}: {age_minutes} minutes old")]
    StaleData { location: String, age_minutes: i64 },
    /// The provider cannot address this kind of location.
    #[error("Unsupported location: {0}")]
    UnsupportedLocation(String),
    /// The provider does not offer this query at all (e.g. forecasts).
    #[error("Not supported by provider: {0}")]
    NotSupported(&'static str),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SourceError::HttpError(status.as_u16())
        } else if err.is_decode() {
            SourceError::ParseError(err.to_string())
        } else if err.is_timeout() {
            SourceError::Network(format!("timeout: {err}"))
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_rounds_to_tenths() {
        let a = Threshold::from_celsius(25.0).unwrap();
        let b = Threshold::from_celsius(25.04).unwrap();
        let c = Threshold::from_celsius(25.06).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.celsius(), 25.1);
    }

    #[test]
    fn test_threshold_rejects_non_finite_and_out_of_range() {
        assert!(Threshold::from_celsius(f64::NAN).is_none());
        assert!(Threshold::from_celsius(f64::INFINITY).is_none());
        assert!(Threshold::from_celsius(100.1).is_none());
        assert!(Threshold::from_celsius(-100.5).is_none());
        assert!(Threshold::from_celsius(-100.0).is_some());
    }

    #[test]
    fn test_negative_zero_is_same_threshold_as_zero() {
        assert_eq!(
            Threshold::from_celsius(-0.0).unwrap(),
            Threshold::from_celsius(0.0).unwrap()
        );
    }

    #[test]
    fn test_crossing_is_inclusive() {
        let t = Threshold::from_celsius(25.0).unwrap();
        assert!(t.is_crossed_by(25.0));
        assert!(t.is_crossed_by(31.2));
        assert!(!t.is_crossed_by(24.99));
    }

    #[test]
    fn test_rearm_point_matches_decimal_reading() {
        let t = Threshold::from_celsius(5.2).unwrap();
        assert_eq!(t.rearm_point(5.0), 0.2);
        let t = Threshold::from_celsius(-3.7).unwrap();
        assert_eq!(t.rearm_point(2.5), -6.2);
    }

    #[test]
    fn test_threshold_ordering_follows_temperature() {
        let cold = Threshold::from_celsius(-5.0).unwrap();
        let warm = Threshold::from_celsius(20.0).unwrap();
        assert!(cold < warm);
    }

    #[test]
    fn test_threshold_display() {
        assert_eq!(Threshold::from_celsius(30.0).unwrap().to_string(), "30.0°C");
        assert_eq!(Threshold::from_celsius(-2.25).unwrap().to_string(), "-2.3°C");
    }

    #[test]
    fn test_fahrenheit_conversion() {
        assert!((fahrenheit_to_celsius(32.0) - 0.0).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(77.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_location_serializes_with_kind_tag() {
        let loc = Location::station("Peoria Airport", "PIA");
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["query"]["kind"], "station");
        assert_eq!(json["query"]["station_id"], "PIA");

        let back: Location = serde_json::from_value(json).unwrap();
        assert_eq!(back, loc);
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::StaleData {
            location: "PIA".to_string(),
            age_minutes: 120,
        };
        assert_eq!(err.to_string(), "Stale data for PIA: 120 minutes old");
        assert_eq!(SourceError::HttpError(503).to_string(), "HTTP error: 503");
    }
}
