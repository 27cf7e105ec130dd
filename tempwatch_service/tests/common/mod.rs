//! In-memory stand-ins for the weather provider, geocoder and chat transport.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use tempwatch_service::alert::engine::{AlertEngine, EngineSettings};
use tempwatch_service::ingest::{Geocoder, TemperatureSource};
use tempwatch_service::model::{ChatId, ForecastHigh, Location, Reading, SourceError};
use tempwatch_service::monitor::{MonitorContext, MonitorRegistry};
use tempwatch_service::notify::{DeliveryError, Notifier};
use tempwatch_service::store::{NullStore, SnapshotStore};

/// Reports whatever temperature the test last set, observed "now".
pub struct DialSource {
    celsius: Mutex<Option<f64>>,
    calls: AtomicUsize,
}

impl DialSource {
    pub fn new(celsius: f64) -> Arc<Self> {
        Arc::new(Self {
            celsius: Mutex::new(Some(celsius)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, celsius: f64) {
        *self.celsius.lock().unwrap() = Some(celsius);
    }

    /// Subsequent fetches fail as if the provider were down.
    pub fn go_offline(&self) {
        *self.celsius.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TemperatureSource for DialSource {
    fn fetch_current(&self, location: &Location) -> Result<Reading, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.celsius.lock().unwrap() {
            Some(celsius) => Ok(Reading {
                celsius,
                observed_at: Utc::now(),
            }),
            None => Err(SourceError::NoDataAvailable(location.name.clone())),
        }
    }

    fn fetch_forecast_high(&self, _location: &Location) -> Result<ForecastHigh, SourceError> {
        Ok(ForecastHigh {
            today: 31.0,
            tomorrow: 28.5,
        })
    }
}

/// Holds every `fetch_current` until `release`, like a provider that is
/// slow to answer. Gives up after ten seconds so a regression fails
/// instead of hanging.
pub struct GatedSource {
    celsius: f64,
    held: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

impl GatedSource {
    pub fn new(celsius: f64) -> Arc<Self> {
        Arc::new(Self {
            celsius,
            held: Mutex::new(true),
            opened: Condvar::new(),
            waiting: AtomicUsize::new(0),
        })
    }

    pub fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.opened.notify_all();
    }

    /// Fetches currently parked on the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

impl TemperatureSource for GatedSource {
    fn fetch_current(&self, _location: &Location) -> Result<Reading, SourceError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let held = self.held.lock().unwrap();
        let _ = self
            .opened
            .wait_timeout_while(held, Duration::from_secs(10), |held| *held)
            .unwrap();
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        Ok(Reading {
            celsius: self.celsius,
            observed_at: Utc::now(),
        })
    }

    fn fetch_forecast_high(&self, location: &Location) -> Result<ForecastHigh, SourceError> {
        Err(SourceError::NoDataAvailable(location.name.clone()))
    }
}

#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl Outbox {
    pub fn messages(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for Outbox {
    fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Knows exactly one city.
pub struct OneCityGeocoder;

impl Geocoder for OneCityGeocoder {
    fn resolve(&self, name: &str) -> Result<Location, SourceError> {
        if name.eq_ignore_ascii_case("berlin") {
            Ok(Location::coordinates("Berlin, Germany", 52.52, 13.41))
        } else {
            Err(SourceError::NoDataAvailable(name.to_string()))
        }
    }
}

pub fn peoria() -> Location {
    Location::coordinates("Peoria, Illinois", 40.6936, -89.5890)
}

pub fn registry_with(
    source: Arc<dyn TemperatureSource>,
    outbox: Arc<Outbox>,
    settings: EngineSettings,
    store: Arc<dyn SnapshotStore>,
    interval: Duration,
) -> MonitorRegistry {
    MonitorRegistry::new(MonitorContext {
        engine: Arc::new(AlertEngine::new(source, outbox, settings)),
        store,
        default_location: peoria(),
        interval,
    })
}

/// Registry whose tickers never fire during a test.
pub fn idle_registry(source: Arc<DialSource>, outbox: Arc<Outbox>) -> MonitorRegistry {
    registry_with(
        source,
        outbox,
        EngineSettings::default(),
        Arc::new(NullStore),
        Duration::from_secs(3600),
    )
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
