//! Chat command parsing and dispatch.
//!
//! Maps `/set`, `/list`, `/clear`, `/city`, `/start` and `/help` onto the
//! monitor registry and returns the reply text. Malformed arguments produce
//! a usage reply and leave state untouched.

use std::sync::Arc;

use thiserror::Error;

use crate::alert::message::compose_watch_list;
use crate::ingest::Geocoder;
use crate::logging::{self, Component};
use crate::model::{ChatId, MAX_THRESHOLD_C, MIN_THRESHOLD_C, SourceError, Threshold};
use crate::monitor::MonitorRegistry;

pub const USAGE: &str = "Temperature alerts\n\
/set <°C> - alert when the temperature reaches a threshold, e.g. /set 25.5\n\
/list - show thresholds and the current temperature\n\
/clear - remove all thresholds\n\
/city <name> - watch a different place, e.g. /city Berlin";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Set(Threshold),
    List,
    Clear,
    City(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("missing argument for /{0}")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a temperature")]
    NotANumber(String),
    #[error("{0} is outside the supported range")]
    OutOfRange(String),
}

impl CommandError {
    /// Reply shown to the chat.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::MissingArgument("set") | CommandError::NotANumber(_) => {
                format!("{}.\nUsage: /set <temperature in °C>, e.g. /set 25.5", self)
            }
            CommandError::OutOfRange(_) => format!(
                "{}. Pick a value between {} and {} °C.",
                self, MIN_THRESHOLD_C, MAX_THRESHOLD_C
            ),
            CommandError::MissingArgument(_) => {
                format!("{}.\nUsage: /city <name>, e.g. /city Berlin", self)
            }
        }
    }
}

/// Parses a threshold argument: `25`, `25.5`, `25,5`, `25°`, `25°C`, `-3 C`.
pub fn parse_threshold(arg: &str) -> Result<Threshold, CommandError> {
    let raw = arg.trim();
    let number = raw
        .trim_end_matches(['C', 'c'])
        .trim_end()
        .trim_end_matches('°')
        .trim_end()
        .replace(',', ".");

    let value: f64 = number
        .parse()
        .map_err(|_| CommandError::NotANumber(raw.to_string()))?;
    if !value.is_finite() {
        return Err(CommandError::NotANumber(raw.to_string()));
    }
    Threshold::from_celsius(value).ok_or_else(|| CommandError::OutOfRange(raw.to_string()))
}

/// Parses a message. `None` for plain text and commands this bot ignores.
pub fn parse_command(text: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    // "/set@weather_bot" in group chats
    let name = head[1..].split('@').next().unwrap_or("").to_ascii_lowercase();

    let command = match name.as_str() {
        "start" => Ok(Command::Start),
        "help" => Ok(Command::Help),
        "list" => Ok(Command::List),
        "clear" => Ok(Command::Clear),
        "set" if rest.is_empty() => Err(CommandError::MissingArgument("set")),
        "set" => parse_threshold(rest).map(Command::Set),
        "city" if rest.is_empty() => Err(CommandError::MissingArgument("city")),
        "city" => Ok(Command::City(rest.to_string())),
        _ => return None,
    };
    Some(command)
}

/// Owns the registry and turns chat messages into replies.
pub struct CommandHandler {
    registry: MonitorRegistry,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl CommandHandler {
    /// `geocoder` is `None` for providers with a fixed station, which
    /// disables `/city`.
    pub fn new(registry: MonitorRegistry, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self { registry, geocoder }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MonitorRegistry {
        &mut self.registry
    }

    /// Handles one incoming message. Returns the reply, if any.
    pub fn handle(&mut self, chat_id: ChatId, text: &str) -> Option<String> {
        let command = match parse_command(text)? {
            Ok(command) => command,
            Err(e) => {
                logging::debug(
                    Component::Telegram,
                    Some(&chat_id.to_string()),
                    &format!("rejected input '{}': {}", text, e),
                );
                return Some(e.user_message());
            }
        };
        Some(self.execute(chat_id, command))
    }

    pub fn execute(&mut self, chat_id: ChatId, command: Command) -> String {
        match command {
            Command::Start | Command::Help => USAGE.to_string(),
            Command::Set(threshold) => self.set(chat_id, threshold),
            Command::List => self.list(chat_id),
            Command::Clear => self.clear(chat_id),
            Command::City(name) => self.city(chat_id, &name),
        }
    }

    fn set(&mut self, chat_id: ChatId, threshold: Threshold) -> String {
        let (added, watches) = self.registry.add_watch(chat_id, threshold);
        let location = self.registry.location_of(chat_id);
        let all = watches
            .iter()
            .map(|w| w.threshold.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        if added {
            logging::info(
                Component::Engine,
                Some(&chat_id.to_string()),
                &format!("watch added at {} for {}", threshold, location),
            );
            format!("Watching {} at {}.\nThresholds: {}", threshold, location, all)
        } else {
            format!("Already watching {}.\nThresholds: {}", threshold, all)
        }
    }

    fn list(&self, chat_id: ChatId) -> String {
        let listing = self.registry.list_watches(chat_id);
        let settings = self.registry.context().engine.settings();
        compose_watch_list(
            &listing.location,
            &listing.watches,
            listing.reading_c,
            settings.fired_policy,
            settings.hysteresis,
        )
    }

    fn clear(&mut self, chat_id: ChatId) -> String {
        match self.registry.clear_watches(chat_id) {
            0 => "Nothing to clear.".to_string(),
            n => {
                logging::info(
                    Component::Engine,
                    Some(&chat_id.to_string()),
                    &format!("cleared {} watch(es)", n),
                );
                format!("Cleared {} threshold(s). Alerts stopped.", n)
            }
        }
    }

    fn city(&mut self, chat_id: ChatId, name: &str) -> String {
        let Some(geocoder) = &self.geocoder else {
            return format!(
                "This bot reads a fixed station ({}); /city is not available.",
                self.registry.location_of(chat_id)
            );
        };

        match geocoder.resolve(name) {
            Ok(location) => {
                let reply = format!("Now watching {}.", location);
                self.registry.set_location(chat_id, location);
                reply
            }
            Err(SourceError::NoDataAvailable(_)) => format!("Could not find '{}'.", name),
            Err(e) => {
                logging::log_source_failure(name, "geocoding", &e);
                "The weather service is unavailable right now, try again later.".to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t(c: f64) -> Threshold {
        Threshold::from_celsius(c).unwrap()
    }

    #[test]
    fn test_parse_threshold_accepts_common_forms() {
        assert_eq!(parse_threshold("25"), Ok(t(25.0)));
        assert_eq!(parse_threshold("25.5"), Ok(t(25.5)));
        assert_eq!(parse_threshold("25,5"), Ok(t(25.5)));
        assert_eq!(parse_threshold("25°"), Ok(t(25.0)));
        assert_eq!(parse_threshold("25°C"), Ok(t(25.0)));
        assert_eq!(parse_threshold("-3 C"), Ok(t(-3.0)));
    }

    #[test]
    fn test_parse_threshold_rejects_garbage() {
        assert_eq!(
            parse_threshold("warm"),
            Err(CommandError::NotANumber("warm".to_string()))
        );
        assert!(matches!(parse_threshold("NaN"), Err(CommandError::NotANumber(_))));
        assert!(matches!(parse_threshold("inf"), Err(CommandError::NotANumber(_))));
        assert!(matches!(parse_threshold("1e9"), Err(CommandError::OutOfRange(_))));
    }

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(parse_command("/start"), Some(Ok(Command::Start)));
        assert_eq!(parse_command("/LIST"), Some(Ok(Command::List)));
        assert_eq!(parse_command("/clear@weather_bot"), Some(Ok(Command::Clear)));
        assert_eq!(parse_command("/set 30"), Some(Ok(Command::Set(t(30.0)))));
        assert_eq!(parse_command("/set@weather_bot  21.5 "), Some(Ok(Command::Set(t(21.5)))));
        assert_eq!(
            parse_command("/city  New York "),
            Some(Ok(Command::City("New York".to_string())))
        );
    }

    #[test]
    fn test_parse_command_missing_arguments() {
        assert_eq!(
            parse_command("/set"),
            Some(Err(CommandError::MissingArgument("set")))
        );
        assert_eq!(
            parse_command("/city   "),
            Some(Err(CommandError::MissingArgument("city")))
        );
    }

    #[test]
    fn test_plain_text_and_unknown_commands_are_ignored() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/weather"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_usage_messages() {
        let msg = CommandError::NotANumber("abc".into()).user_message();
        assert!(msg.contains("Usage: /set"));
        let msg = CommandError::OutOfRange("500".into()).user_message();
        assert!(msg.contains("between -100 and 100"));
        let msg = CommandError::MissingArgument("city").user_message();
        assert!(msg.contains("Usage: /city"));
    }
}
