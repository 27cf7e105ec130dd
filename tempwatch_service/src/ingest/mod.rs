//! Temperature sources.
//!
//! A source answers two stateless queries for a `Location`: the latest
//! observed temperature and the forecast daily high. Sources are shared by
//! every chat's ticker thread, so they must be `Send + Sync`.
//!
//! Providers:
//! - `open_meteo`: gridded model data by coordinates, with forecast and geocoding.
//! - `iem`: Iowa Environmental Mesonet current conditions for an ASOS station.

pub mod iem;
pub mod open_meteo;

use std::time::Duration;

use crate::model::{ForecastHigh, Location, Reading, SourceError};

pub trait TemperatureSource: Send + Sync {
    /// Latest observed ambient temperature at `location`, in °C.
    fn fetch_current(&self, location: &Location) -> Result<Reading, SourceError>;

    /// Forecast maxima for today and tomorrow at `location`, in °C.
    fn fetch_forecast_high(&self, location: &Location) -> Result<ForecastHigh, SourceError>;
}

/// Resolves a free-form place name to a `Location`.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Location, SourceError>;
}

/// Blocking HTTP client with a bounded per-request timeout, so a hung
/// upstream cannot hold a chat's ticker indefinitely.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tempwatch/", env!("CARGO_PKG_VERSION")))
        .build()
}
