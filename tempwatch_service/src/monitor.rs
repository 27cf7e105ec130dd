//! Per-chat monitors and their tickers.
//!
//! Each chat with at least one watch owns a `Ticker`: a dedicated thread
//! that sleeps for the tick interval, fetches a reading, then locks the
//! chat's state only to evaluate its watches. The alert goes out after the
//! lock is released, so a slow provider or chat API never stalls commands.
//! Ticks of one chat never overlap because one thread runs them in
//! sequence. Chats share nothing mutable with each other.
//!
//! Lifecycle invariant: a monitor's ticker is running iff its watch set is
//! non-empty. `add_watch` starts it, `clear_watches` cancels it, and a ticker
//! whose watch set empties (one-shot firing) stops itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;

use crate::alert::engine::AlertEngine;
use crate::alert::thresholds::{Watch, WatchSet};
use crate::logging::{self, Component};
use crate::model::{ChatId, Location, Threshold};
use crate::store::{ChatSnapshot, SnapshotStore};

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Everything a ticker needs besides its own chat's state.
pub struct MonitorContext {
    pub engine: Arc<AlertEngine>,
    pub store: Arc<dyn SnapshotStore>,
    pub default_location: Location,
    pub interval: Duration,
}

impl MonitorContext {
    fn persist(&self, chat_id: ChatId, state: &MonitorState) {
        let snapshot = state.snapshot(chat_id);
        let result = if snapshot.is_blank() {
            self.store.remove(chat_id)
        } else {
            self.store.save(&snapshot)
        };
        if let Err(e) = result {
            logging::error(
                Component::Store,
                Some(&chat_id.to_string()),
                &format!("snapshot write failed: {}", e),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Chat state
// ---------------------------------------------------------------------------

/// The mutable part of a chat's monitor, shared with its ticker thread.
#[derive(Debug, Default)]
pub struct MonitorState {
    /// Explicitly bound location; `None` uses the deployment default.
    pub location: Option<Location>,
    pub watches: WatchSet,
}

impl MonitorState {
    fn snapshot(&self, chat_id: ChatId) -> ChatSnapshot {
        ChatSnapshot {
            chat_id,
            location: self.location.clone(),
            watches: self.watches.iter().collect(),
        }
    }

    fn effective_location(&self, default: &Location) -> Location {
        self.location.clone().unwrap_or_else(|| default.clone())
    }
}

fn lock_state(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Ownership of a chat's running timer. Dropping it cancels the timer.
pub struct Ticker {
    cancel: Option<Sender<()>>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn spawn(
        chat_id: ChatId,
        state: Arc<Mutex<MonitorState>>,
        ctx: Arc<MonitorContext>,
    ) -> std::io::Result<Ticker> {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let stopped = Arc::new(AtomicBool::new(false));
        let thread_stopped = Arc::clone(&stopped);

        let handle = thread::Builder::new()
            .name(format!("ticker-{}", chat_id))
            .spawn(move || {
                let chat = chat_id.to_string();
                logging::debug(Component::Engine, Some(&chat), "ticker started");

                loop {
                    // A message or a dropped sender both mean cancel.
                    match cancel_rx.recv_timeout(ctx.interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let location = {
                        let guard = lock_state(&state);
                        // Cancellation may have been requested while we waited for the lock.
                        if thread_stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        if guard.watches.is_empty() {
                            thread_stopped.store(true, Ordering::SeqCst);
                            break;
                        }
                        guard.effective_location(&ctx.default_location)
                    };

                    // The chat lock is not held across source or notifier calls.
                    let Some(reading) = ctx.engine.reading_at(&location, Utc::now()) else {
                        continue;
                    };

                    let (fired, emptied) = {
                        let mut guard = lock_state(&state);
                        if thread_stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        // `/city` moved the chat while we were fetching.
                        if guard.effective_location(&ctx.default_location) != location {
                            continue;
                        }

                        let evaluation = ctx.engine.evaluate(&mut guard.watches, reading.celsius);
                        if evaluation.changed_watches() {
                            ctx.persist(chat_id, &guard);
                        }
                        let emptied = guard.watches.is_empty();
                        if emptied {
                            thread_stopped.store(true, Ordering::SeqCst);
                        }
                        (evaluation.fired, emptied)
                    };

                    if !fired.is_empty() {
                        ctx.engine.deliver(chat_id, &location, reading.celsius, &fired);
                    }
                    if emptied {
                        logging::debug(Component::Engine, Some(&chat), "no watches left");
                        break;
                    }
                }

                logging::debug(Component::Engine, Some(&chat), "ticker stopped");
            })?;

        Ok(Ticker {
            cancel: Some(cancel_tx),
            stopped,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Requests a stop. No tick starts after this returns.
    pub fn cancel(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.take();
    }

    /// Cancels and waits for the thread to exit.
    pub fn join(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// ChatMonitor
// ---------------------------------------------------------------------------

pub struct ChatMonitor {
    chat_id: ChatId,
    state: Arc<Mutex<MonitorState>>,
    ticker: Option<Ticker>,
}

impl ChatMonitor {
    fn new(chat_id: ChatId, state: MonitorState) -> Self {
        Self {
            chat_id,
            state: Arc::new(Mutex::new(state)),
            ticker: None,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(Ticker::is_running)
    }

    /// Starts a ticker unless one is already running. Call with the state
    /// lock held whenever a ticker may exist: a ticker stops itself under
    /// that lock, so `is_ticking` cannot be stale here.
    fn ensure_ticker(&mut self, ctx: &Arc<MonitorContext>) {
        if self.is_ticking() {
            return;
        }
        match Ticker::spawn(self.chat_id, Arc::clone(&self.state), Arc::clone(ctx)) {
            Ok(ticker) => self.ticker = Some(ticker),
            Err(e) => logging::error(
                Component::Engine,
                Some(&self.chat_id.to_string()),
                &format!("failed to start ticker: {}", e),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only projection returned by `list_watches`.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchListing {
    pub location: Location,
    pub watches: Vec<Watch>,
    /// Live reading in °C, `None` if the source failed.
    pub reading_c: Option<f64>,
}

/// All chat monitors, owned by the command dispatcher.
pub struct MonitorRegistry {
    monitors: HashMap<ChatId, ChatMonitor>,
    ctx: Arc<MonitorContext>,
}

impl MonitorRegistry {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            monitors: HashMap::new(),
            ctx: Arc::new(ctx),
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    fn monitor_mut(&mut self, chat_id: ChatId) -> &mut ChatMonitor {
        self.monitors
            .entry(chat_id)
            .or_insert_with(|| ChatMonitor::new(chat_id, MonitorState::default()))
    }

    /// Rebuilds monitors from stored snapshots and starts tickers for chats
    /// that have watches. Blank snapshots are skipped. Returns the number of
    /// chats restored.
    pub fn restore(&mut self, snapshots: Vec<ChatSnapshot>) -> usize {
        let mut restored = 0;
        for snapshot in snapshots {
            if snapshot.is_blank() {
                continue;
            }
            let mut watches = WatchSet::new();
            for watch in snapshot.watches {
                watches.restore(watch);
            }
            let state = MonitorState {
                location: snapshot.location,
                watches,
            };
            let has_watches = !state.watches.is_empty();

            let ctx = Arc::clone(&self.ctx);
            let monitor = self.monitors.entry(snapshot.chat_id).or_insert_with(|| {
                ChatMonitor::new(snapshot.chat_id, MonitorState::default())
            });
            *lock_state(&monitor.state) = state;
            if has_watches {
                monitor.ensure_ticker(&ctx);
            }
            restored += 1;
        }
        restored
    }

    /// Idempotent upsert by threshold. Starts the chat's ticker on the first
    /// watch. Returns whether the watch was new, and the updated watch set.
    pub fn add_watch(&mut self, chat_id: ChatId, threshold: Threshold) -> (bool, Vec<Watch>) {
        let ctx = Arc::clone(&self.ctx);
        let monitor = self.monitor_mut(chat_id);
        let state = Arc::clone(&monitor.state);
        let mut guard = lock_state(&state);

        let added = guard.watches.add(threshold);
        if added {
            ctx.persist(chat_id, &guard);
        }
        monitor.ensure_ticker(&ctx);

        (added, guard.watches.iter().collect())
    }

    /// Watches with their state plus a live reading. The chat lock is not
    /// held during the reading fetch.
    pub fn list_watches(&self, chat_id: ChatId) -> WatchListing {
        let (location, watches) = match self.monitors.get(&chat_id) {
            Some(monitor) => {
                let guard = lock_state(&monitor.state);
                (
                    guard.effective_location(&self.ctx.default_location),
                    guard.watches.iter().collect::<Vec<_>>(),
                )
            }
            None => (self.ctx.default_location.clone(), Vec::new()),
        };

        let reading_c = self.ctx.engine.current_reading(&location);
        WatchListing {
            location,
            watches,
            reading_c,
        }
    }

    /// Removes every watch and cancels the ticker. Returns how many watches
    /// were removed.
    pub fn clear_watches(&mut self, chat_id: ChatId) -> usize {
        let ctx = Arc::clone(&self.ctx);
        let Some(monitor) = self.monitors.get_mut(&chat_id) else {
            return 0;
        };

        let state = Arc::clone(&monitor.state);
        let mut guard = lock_state(&state);
        if let Some(mut ticker) = monitor.ticker.take() {
            ticker.cancel();
        }

        let removed = guard.watches.len();
        guard.watches.clear();
        ctx.persist(chat_id, &guard);
        removed
    }

    /// Binds `location` to the chat. Watches and ticker are untouched.
    pub fn set_location(&mut self, chat_id: ChatId, location: Location) {
        let ctx = Arc::clone(&self.ctx);
        let monitor = self.monitor_mut(chat_id);
        let mut guard = lock_state(&monitor.state);
        guard.location = Some(location);
        ctx.persist(chat_id, &guard);
    }

    pub fn location_of(&self, chat_id: ChatId) -> Location {
        match self.monitors.get(&chat_id) {
            Some(monitor) => lock_state(&monitor.state).effective_location(&self.ctx.default_location),
            None => self.ctx.default_location.clone(),
        }
    }

    pub fn is_ticking(&self, chat_id: ChatId) -> bool {
        self.monitors
            .get(&chat_id)
            .is_some_and(ChatMonitor::is_ticking)
    }

    pub fn ticking_chats(&self) -> usize {
        self.monitors.values().filter(|m| m.is_ticking()).count()
    }

    /// Cancels every ticker and waits for the threads to exit.
    pub fn shutdown(&mut self) {
        for monitor in self.monitors.values_mut() {
            if let Some(ticker) = monitor.ticker.take() {
                ticker.join();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
