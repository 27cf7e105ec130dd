/// IEM (Iowa Environmental Mesonet) current conditions client
///
/// Retrieves the latest ASOS (Automated Surface Observing System) observation
/// for a single station from the Iowa State University Mesonet API. ASOS
/// reports air temperature in °F; it is converted to °C here so nothing past
/// the ingest boundary sees Fahrenheit.
///
/// Current conditions: https://mesonet.agron.iastate.edu/json/current.py

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::TemperatureSource;
use crate::model::{
    ForecastHigh, Location, LocationQuery, Reading, SourceError, fahrenheit_to_celsius,
};

const IEM_BASE_URL: &str = "https://mesonet.agron.iastate.edu";

// ============================================================================
// IEM API Response Structures
// ============================================================================

/// Current observation response from IEM
#[derive(Debug, Deserialize)]
pub struct IemCurrentResponse {
    pub data: Vec<IemObservation>,
}

/// Single weather observation
#[derive(Debug, Deserialize)]
pub struct IemObservation {
    pub station: String,
    pub valid: String, // ISO 8601 timestamp
    #[serde(rename = "tmpf")]
    pub temp_f: Option<f64>,
}

// ============================================================================
// API Client
// ============================================================================

pub struct IemSource {
    client: reqwest::blocking::Client,
}

impl IemSource {
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl TemperatureSource for IemSource {
    fn fetch_current(&self, location: &Location) -> Result<Reading, SourceError> {
        let station_id = match &location.query {
            LocationQuery::Station { station_id } => station_id,
            LocationQuery::Coordinates { .. } => {
                return Err(SourceError::UnsupportedLocation(format!(
                    "'{}' is not an ASOS station",
                    location.name
                )));
            }
        };

        let url = format!("{}/json/current.py", IEM_BASE_URL);
        let response = self
            .client
            .get(&url)
            .query(&[("station", station_id.as_str())])
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(SourceError::HttpError(response.status().as_u16()));
        }

        parse_current_response(&response.text()?, station_id)
    }

    /// ASOS stations observe; they do not forecast.
    fn fetch_forecast_high(&self, _location: &Location) -> Result<ForecastHigh, SourceError> {
        Err(SourceError::NotSupported("forecast"))
    }
}

// ============================================================================
// Parsing
// ============================================================================

pub fn parse_current_response(body: &str, station_id: &str) -> Result<Reading, SourceError> {
    let api_response: IemCurrentResponse =
        serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))?;

    let obs = api_response
        .data
        .into_iter()
        .find(|o| o.station.eq_ignore_ascii_case(station_id))
        .ok_or_else(|| SourceError::NoDataAvailable(station_id.to_string()))?;

    parse_observation(obs)
}

/// Parse a single IEM observation into a Celsius reading
fn parse_observation(obs: IemObservation) -> Result<Reading, SourceError> {
    let temp_f = obs
        .temp_f
        .ok_or_else(|| SourceError::NoDataAvailable(obs.station.clone()))?;

    let observed_at = DateTime::parse_from_rfc3339(&obs.valid)
        .map_err(|e| SourceError::ParseError(format!("valid '{}': {}", obs.valid, e)))?
        .with_timezone(&Utc);

    Ok(Reading {
        celsius: fahrenheit_to_celsius(temp_f),
        observed_at,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_converts_fahrenheit_and_timestamp() {
        let body = r#"{"data": [{"station": "PIA",
            "valid": "2024-05-01T12:54:00Z", "tmpf": 77.0, "dwpf": 55.0}]}"#;
        let reading = parse_current_response(body, "PIA").unwrap();
        assert!((reading.celsius - 25.0).abs() < 1e-9);
        assert_eq!(
            reading.observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 54, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_missing_temperature_is_no_data() {
        let body = r#"{"data": [{"station": "PIA",
            "valid": "2024-05-01T12:54:00Z", "tmpf": null}]}"#;
        assert_eq!(
            parse_current_response(body, "PIA"),
            Err(SourceError::NoDataAvailable("PIA".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_data_is_no_data() {
        assert_eq!(
            parse_current_response(r#"{"data": []}"#, "PIA"),
            Err(SourceError::NoDataAvailable("PIA".to_string()))
        );
    }

    #[test]
    fn test_parse_bad_timestamp_is_parse_error() {
        let body = r#"{"data": [{"station": "PIA", "valid": "yesterday", "tmpf": 50.0}]}"#;
        assert!(matches!(
            parse_current_response(body, "PIA"),
            Err(SourceError::ParseError(_))
        ));
    }

    #[test]
    fn test_coordinates_location_is_rejected() {
        let client = reqwest::blocking::Client::new();
        let source = IemSource::new(client);
        let loc = Location::coordinates("Peoria", 40.69, -89.59);
        assert!(matches!(
            source.fetch_current(&loc),
            Err(SourceError::UnsupportedLocation(_))
        ));
    }

    #[test]
    fn test_forecast_is_not_supported() {
        let source = IemSource::new(reqwest::blocking::Client::new());
        let loc = Location::station("Peoria Airport", "PIA");
        assert_eq!(
            source.fetch_forecast_high(&loc),
            Err(SourceError::NotSupported("forecast"))
        );
    }

    #[test]
    #[ignore] // Don't run in CI - depends on external API
    fn iem_live_current_reading_for_peoria() {
        let client = super::super::build_http_client(std::time::Duration::from_secs(30)).unwrap();
        let source = IemSource::new(client);
        let reading = source
            .fetch_current(&Location::station("Peoria Airport", "PIA"))
            .expect("IEM should return a current PIA observation");
        assert!(reading.celsius > -50.0 && reading.celsius < 50.0);
    }
}
