//! Threshold watches and the per-chat watch set.
//!
//! A watch is either armed (will fire on the next crossing) or fired (has
//! notified and is waiting to re-arm). The set is keyed by threshold, so a
//! threshold appears at most once per chat.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Armed,
    Fired,
}

/// One user-declared alert target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    pub threshold: Threshold,
    pub state: WatchState,
}

impl Watch {
    pub fn is_armed(&self) -> bool {
        self.state == WatchState::Armed
    }
}

/// The watches of one chat, ordered by ascending threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSet {
    watches: BTreeMap<Threshold, WatchState>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an armed watch. Returns `false` and leaves the existing watch
    /// untouched if the threshold is already present.
    pub fn add(&mut self, threshold: Threshold) -> bool {
        if self.watches.contains_key(&threshold) {
            return false;
        }
        self.watches.insert(threshold, WatchState::Armed);
        true
    }

    /// Inserts a watch with an explicit state, replacing any existing one.
    /// Used when restoring a snapshot.
    pub fn restore(&mut self, watch: Watch) {
        self.watches.insert(watch.threshold, watch.state);
    }

    pub fn clear(&mut self) {
        self.watches.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn get(&self, threshold: Threshold) -> Option<Watch> {
        self.watches.get(&threshold).map(|&state| Watch { threshold, state })
    }

    pub fn iter(&self) -> impl Iterator<Item = Watch> + '_ {
        self.watches
            .iter()
            .map(|(&threshold, &state)| Watch { threshold, state })
    }

    /// Armed watches whose threshold is at or below `reading_c`, ascending.
    pub fn crossings(&self, reading_c: f64) -> Vec<Threshold> {
        self.iter()
            .filter(|w| w.is_armed() && w.threshold.is_crossed_by(reading_c))
            .map(|w| w.threshold)
            .collect()
    }

    pub fn mark_fired(&mut self, thresholds: &[Threshold]) {
        for t in thresholds {
            if let Some(state) = self.watches.get_mut(t) {
                *state = WatchState::Fired;
            }
        }
    }

    pub fn remove(&mut self, thresholds: &[Threshold]) {
        for t in thresholds {
            self.watches.remove(t);
        }
    }

    /// Re-arms every fired watch whose threshold exceeds `reading_c` by more
    /// than `margin` (see `Threshold::rearm_point`). Returns the thresholds
    /// that were re-armed.
    pub fn rearm_below(&mut self, reading_c: f64, margin: f64) -> Vec<Threshold> {
        let mut rearmed = Vec::new();
        for (threshold, state) in self.watches.iter_mut() {
            if *state == WatchState::Fired && reading_c < threshold.rearm_point(margin) {
                *state = WatchState::Armed;
                rearmed.push(*threshold);
            }
        }
        rearmed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
