/// Open-Meteo API client
///
/// Current temperature and daily maxima come from the forecast endpoint,
/// place-name lookup from the geocoding endpoint. Both are free and keyless.
///
/// API Documentation: https://open-meteo.com/en/docs
/// Geocoding: https://open-meteo.com/en/docs/geocoding-api

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;

use super::{Geocoder, TemperatureSource};
use crate::model::{ForecastHigh, Location, LocationQuery, Reading, SourceError};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    #[serde(default)]
    utc_offset_seconds: i64,
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    /// Local time in the requested timezone, e.g. "2024-05-01T13:00"
    time: String,
    temperature_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    temperature_2m_max: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    /// Absent entirely when nothing matched.
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct OpenMeteoSource {
    client: reqwest::blocking::Client,
}

impl OpenMeteoSource {
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(SourceError::HttpError(response.status().as_u16()));
        }

        Ok(response.text()?)
    }
}

fn coordinates_of(location: &Location) -> Result<(f64, f64), SourceError> {
    match &location.query {
        LocationQuery::Coordinates { latitude, longitude } => Ok((*latitude, *longitude)),
        LocationQuery::Station { station_id } => Err(SourceError::UnsupportedLocation(format!(
            "station '{}' has no coordinates",
            station_id
        ))),
    }
}

impl TemperatureSource for OpenMeteoSource {
    fn fetch_current(&self, location: &Location) -> Result<Reading, SourceError> {
        let (latitude, longitude) = coordinates_of(location)?;
        let body = self.get_json(
            FORECAST_URL,
            &[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("timezone", "auto".to_string()),
            ],
        )?;
        parse_current_response(&body, &location.name)
    }

    fn fetch_forecast_high(&self, location: &Location) -> Result<ForecastHigh, SourceError> {
        let (latitude, longitude) = coordinates_of(location)?;
        let body = self.get_json(
            FORECAST_URL,
            &[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", "temperature_2m_max".to_string()),
                ("forecast_days", "2".to_string()),
                ("timezone", "auto".to_string()),
            ],
        )?;
        parse_daily_response(&body, &location.name)
    }
}

impl Geocoder for OpenMeteoSource {
    fn resolve(&self, name: &str) -> Result<Location, SourceError> {
        let body = self.get_json(
            GEOCODING_URL,
            &[
                ("name", name.to_string()),
                ("count", "1".to_string()),
                ("language", "en".to_string()),
                ("format", "json".to_string()),
            ],
        )?;
        parse_geocoding_response(&body, name)
    }
}

// ============================================================================
// Parsing
// ============================================================================

pub fn parse_current_response(body: &str, location: &str) -> Result<Reading, SourceError> {
    let response: CurrentResponse =
        serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))?;

    let current = response
        .current
        .ok_or_else(|| SourceError::NoDataAvailable(location.to_string()))?;
    let celsius = current
        .temperature_2m
        .ok_or_else(|| SourceError::NoDataAvailable(location.to_string()))?;

    // "time" is local wall-clock time; shift back by the reported offset.
    let local = NaiveDateTime::parse_from_str(&current.time, "%Y-%m-%dT%H:%M")
        .map_err(|e| SourceError::ParseError(format!("current.time '{}': {}", current.time, e)))?;
    let observed_at = DateTime::<Utc>::from_naive_utc_and_offset(local, Utc)
        - Duration::seconds(response.utc_offset_seconds);

    Ok(Reading {
        celsius,
        observed_at,
    })
}

pub fn parse_daily_response(body: &str, location: &str) -> Result<ForecastHigh, SourceError> {
    let response: DailyResponse =
        serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))?;

    let maxima = response
        .daily
        .map(|d| d.temperature_2m_max)
        .unwrap_or_default();

    match maxima.as_slice() {
        [Some(today), Some(tomorrow), ..] => Ok(ForecastHigh {
            today: *today,
            tomorrow: *tomorrow,
        }),
        _ => Err(SourceError::NoDataAvailable(location.to_string())),
    }
}

pub fn parse_geocoding_response(body: &str, query: &str) -> Result<Location, SourceError> {
    let response: GeocodingResponse =
        serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))?;

    let hit = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NoDataAvailable(query.to_string()))?;

    let mut label = hit.name;
    for part in [hit.admin1, hit.country].into_iter().flatten() {
        if !label.contains(&part) {
            label.push_str(", ");
            label.push_str(&part);
        }
    }

    Ok(Location::coordinates(label, hit.latitude, hit.longitude))
}

// ============================================================================
// Tests
// ============================================================================
