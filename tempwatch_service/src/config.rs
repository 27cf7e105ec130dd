//! Service configuration.
//!
//! Settings come from a TOML file (default `tempwatch.toml`, overridden by
//! `TEMPWATCH_CONFIG`); every key is optional. Secrets never live in the
//! file: the bot token and database URL are read from the environment,
//! which `.env` may populate.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::alert::engine::{EngineSettings, FiredPolicy, SummaryPolicy};
use crate::logging::LogLevel;
use crate::model::Location;

pub const DEFAULT_CONFIG_PATH: &str = "tempwatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interval_secs: u64,
    pub hysteresis: f64,
    pub fired_policy: FiredPolicy,
    pub summary_policy: SummaryPolicy,
    pub max_reading_age_minutes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            interval_secs: 60,
            hysteresis: engine.hysteresis,
            fired_policy: engine.fired_policy,
            summary_policy: engine.summary_policy,
            max_reading_age_minutes: engine.max_reading_age_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenMeteo,
    Iem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub provider: Provider,
    pub timeout_secs: u64,
    /// Location for chats that never ran `/city` (Open-Meteo).
    pub default_city: CityConfig,
    /// The one station every chat reads (IEM).
    pub station: StationConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenMeteo,
            timeout_secs: 10,
            default_city: CityConfig {
                name: "Peoria, Illinois".to_string(),
                latitude: 40.6936,
                longitude: -89.5890,
            },
            station: StationConfig {
                id: "PIA".to_string(),
                name: "Peoria International Airport".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub poll_timeout_secs: u64,
    pub api_base: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Json,
    Postgres,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: PathBuf::from("tempwatch_state.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub source: SourceConfig,
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.interval_secs == 0 {
            return Err(ConfigError::Invalid("engine.interval_secs must be > 0".into()));
        }
        if !self.engine.hysteresis.is_finite() || self.engine.hysteresis < 0.0 {
            return Err(ConfigError::Invalid("engine.hysteresis must be >= 0".into()));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid("source.timeout_secs must be > 0".into()));
        }
        let city = &self.source.default_city;
        if !(-90.0..=90.0).contains(&city.latitude) || !(-180.0..=180.0).contains(&city.longitude) {
            return Err(ConfigError::Invalid(format!(
                "source.default_city coordinates out of range: {}, {}",
                city.latitude, city.longitude
            )));
        }
        if self.source.provider == Provider::Iem && self.source.station.id.trim().is_empty() {
            return Err(ConfigError::Invalid("source.station.id is required for iem".into()));
        }
        Ok(())
    }

    /// `PORT` overrides `health.port`, as hosting platforms assign it.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("PORT") {
            self.health.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT '{}' is not a port number", port)))?;
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fired_policy: self.engine.fired_policy,
            summary_policy: self.engine.summary_policy,
            hysteresis: self.engine.hysteresis,
            max_reading_age_minutes: self.engine.max_reading_age_minutes,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.engine.interval_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub fn telegram_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram.poll_timeout_secs)
    }

    /// The location a chat uses until it binds its own.
    pub fn default_location(&self) -> Location {
        match self.source.provider {
            Provider::OpenMeteo => {
                let city = &self.source.default_city;
                Location::coordinates(city.name.clone(), city.latitude, city.longitude)
            }
            Provider::Iem => {
                let station = &self.source.station;
                Location::station(station.name.clone(), station.id.trim().to_ascii_uppercase())
            }
        }
    }
}

/// `TEMPWATCH_CONFIG` or `tempwatch.toml` in the working directory.
pub fn config_path() -> PathBuf {
    env::var_os("TEMPWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn bot_token() -> Result<String, ConfigError> {
    required_env("TELEGRAM_BOT_TOKEN")
}

pub fn database_url() -> Result<String, ConfigError> {
    required_env("DATABASE_URL")
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
