//! Text composed for chats: alert notifications and `/list` replies.

use std::fmt::Write;

use crate::model::{ForecastHigh, Location, Threshold};

use super::engine::{FiredPolicy, SummaryPolicy};
use super::thresholds::{Watch, WatchState};

fn join_thresholds(thresholds: &[Threshold]) -> String {
    thresholds
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One notification for all crossings of a tick. `crossed` is ascending.
pub fn compose_alert(
    location: &Location,
    reading_c: f64,
    forecast: Option<ForecastHigh>,
    crossed: &[Threshold],
    summary: SummaryPolicy,
) -> String {
    let mut text = format!("🌡 Temperature alert for {}\n", location);
    let _ = writeln!(text, "Now: {:.1}°C", reading_c);

    match forecast {
        Some(f) => {
            let _ = writeln!(
                text,
                "Forecast high: today {:.1}°C, tomorrow {:.1}°C",
                f.today, f.tomorrow
            );
        }
        None => text.push_str("Forecast high: unavailable\n"),
    }

    match summary {
        SummaryPolicy::AllCrossed => {
            let _ = write!(text, "Crossed: {}", join_thresholds(crossed));
        }
        SummaryPolicy::HighestOnly => {
            if let Some(highest) = crossed.last() {
                let _ = write!(text, "Crossed: {}", highest);
            }
        }
    }
    text
}

/// Reply to `/list`. `reading_c` is `None` when the live reading failed.
pub fn compose_watch_list(
    location: &Location,
    watches: &[Watch],
    reading_c: Option<f64>,
    fired_policy: FiredPolicy,
    hysteresis: f64,
) -> String {
    if watches.is_empty() {
        return "No thresholds set. Use /set <temperature> to add one.".to_string();
    }

    let mut text = format!("Watching {}:\n", location);
    for watch in watches {
        match (watch.state, fired_policy) {
            (WatchState::Armed, _) => {
                let _ = writeln!(text, "• {} (armed)", watch.threshold);
            }
            (WatchState::Fired, FiredPolicy::Rearm) => {
                let _ = writeln!(
                    text,
                    "• {} (fired, re-arms below {:.1}°C)",
                    watch.threshold,
                    watch.threshold.rearm_point(hysteresis)
                );
            }
            (WatchState::Fired, FiredPolicy::OneShot) => {
                let _ = writeln!(text, "• {} (fired)", watch.threshold);
            }
        }
    }

    match reading_c {
        Some(c) => {
            let _ = write!(text, "Now: {:.1}°C", c);
        }
        None => text.push_str("Now: unavailable"),
    }
    text
}
