use thiserror::Error;

use crate::model::ChatId;

pub mod telegram;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to send message: {0}")]
    SendFailed(String),
    #[error("Network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the bot token.
        DeliveryError::Network(err.without_url())
    }
}

/// Delivers a text message to a chat.
///
/// Fire-and-forget from the engine's point of view: a failed delivery is
/// logged by the caller and never rolls back watch state.
pub trait Notifier: Send + Sync {
    fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError>;
}
