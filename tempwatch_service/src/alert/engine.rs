//! The threshold-crossing alert engine.
//!
//! A tick is one evaluation cycle for one chat: a single current-reading
//! query, at most one notification, and in-place updates to the chat's
//! watch set. Only `evaluate` touches the watch set, and it does no I/O, so
//! callers can lock the set around that phase alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::message::compose_alert;
use super::staleness::ensure_fresh_at;
use super::thresholds::WatchSet;
use crate::ingest::TemperatureSource;
use crate::logging::{self, Component};
use crate::model::{ChatId, Location, Reading, Threshold};
use crate::notify::Notifier;

/// What happens to a watch after it fires. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiredPolicy {
    /// Stay silent until the reading drops below `threshold - hysteresis`,
    /// then arm again.
    Rearm,
    /// Remove the watch.
    OneShot,
}

/// Which crossed thresholds a notification names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPolicy {
    AllCrossed,
    HighestOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub fired_policy: FiredPolicy,
    pub summary_policy: SummaryPolicy,
    /// Hysteresis margin H in °C, applied at 0.1 °C resolution.
    pub hysteresis: f64,
    pub max_reading_age_minutes: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fired_policy: FiredPolicy::Rearm,
            summary_policy: SummaryPolicy::AllCrossed,
            hysteresis: 5.0,
            max_reading_age_minutes: 90,
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The chat has no watches; its ticker should stop.
    Idle,
    /// No usable reading. Nothing was changed or sent.
    Skipped,
    Evaluated {
        reading_c: f64,
        /// Thresholds that crossed this tick, ascending.
        fired: Vec<Threshold>,
        rearmed: Vec<Threshold>,
        /// `false` if there was a crossing but the notifier failed.
        delivered: bool,
    },
}

impl TickOutcome {
    pub fn changed_watches(&self) -> bool {
        match self {
            TickOutcome::Evaluated { fired, rearmed, .. } => {
                !fired.is_empty() || !rearmed.is_empty()
            }
            TickOutcome::Idle | TickOutcome::Skipped => false,
        }
    }
}

/// Watch changes made by `AlertEngine::evaluate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Thresholds that crossed, ascending.
    pub fired: Vec<Threshold>,
    pub rearmed: Vec<Threshold>,
}

impl Evaluation {
    pub fn changed_watches(&self) -> bool {
        !self.fired.is_empty() || !self.rearmed.is_empty()
    }
}

pub struct AlertEngine {
    source: Arc<dyn TemperatureSource>,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
}

impl AlertEngine {
    pub fn new(
        source: Arc<dyn TemperatureSource>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs one full tick as of `now` on a watch set the caller holds for the
    /// whole cycle, source and notifier calls included. Tickers run the same
    /// phases (`reading_at`, `evaluate`, `deliver`) but hold the chat lock
    /// only around `evaluate`.
    pub fn tick_at(
        &self,
        chat_id: ChatId,
        location: &Location,
        watches: &mut WatchSet,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        if watches.is_empty() {
            return TickOutcome::Idle;
        }

        let Some(reading) = self.reading_at(location, now) else {
            return TickOutcome::Skipped;
        };

        let Evaluation { fired, rearmed } = self.evaluate(watches, reading.celsius);
        let delivered = !fired.is_empty() && self.deliver(chat_id, location, reading.celsius, &fired);

        TickOutcome::Evaluated {
            reading_c: reading.celsius,
            fired,
            rearmed,
            delivered,
        }
    }

    /// Current reading at `location`, rejected if stale as of `now`.
    /// Failures are logged and yield `None`.
    pub fn reading_at(&self, location: &Location, now: DateTime<Utc>) -> Option<Reading> {
        let result = self.source.fetch_current(location).and_then(|r| {
            ensure_fresh_at(r, &location.name, self.settings.max_reading_age_minutes, now)
        });
        match result {
            Ok(reading) => Some(reading),
            Err(e) => {
                logging::log_source_failure(&location.name, "current reading", &e);
                None
            }
        }
    }

    /// Live reading for display.
    pub fn current_reading(&self, location: &Location) -> Option<f64> {
        self.reading_at(location, Utc::now()).map(|r| r.celsius)
    }

    /// Applies one reading to `watches`. Crossed watches are marked fired
    /// (or removed under one-shot), then fired watches below the re-arm
    /// point arm again. No I/O.
    pub fn evaluate(&self, watches: &mut WatchSet, reading_c: f64) -> Evaluation {
        let fired = watches.crossings(reading_c);

        let rearmed = match self.settings.fired_policy {
            FiredPolicy::Rearm => {
                watches.mark_fired(&fired);
                watches.rearm_below(reading_c, self.settings.hysteresis)
            }
            FiredPolicy::OneShot => {
                watches.remove(&fired);
                Vec::new()
            }
        };

        Evaluation { fired, rearmed }
    }

    /// Sends one alert naming `fired`, with the forecast high when the source
    /// has one. Returns whether the notifier accepted it. A failed send is
    /// logged and not retried.
    pub fn deliver(
        &self,
        chat_id: ChatId,
        location: &Location,
        reading_c: f64,
        fired: &[Threshold],
    ) -> bool {
        let forecast = match self.source.fetch_forecast_high(location) {
            Ok(f) => Some(f),
            Err(e) => {
                logging::log_source_failure(&location.name, "forecast", &e);
                None
            }
        };

        let text = compose_alert(location, reading_c, forecast, fired, self.settings.summary_policy);

        let chat = chat_id.to_string();
        match self.notifier.notify(chat_id, &text) {
            Ok(()) => {
                logging::info(
                    Component::Engine,
                    Some(&chat),
                    &format!(
                        "{:.1}°C crossed {} threshold(s) at {}",
                        reading_c,
                        fired.len(),
                        location
                    ),
                );
                true
            }
            Err(e) => {
                logging::error(
                    Component::Telegram,
                    Some(&chat),
                    &format!("alert delivery failed: {}", e),
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
