//! Telegram Bot API client: long-polling for incoming commands and
//! `sendMessage` for replies and alerts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DeliveryError, Notifier};
use crate::model::ChatId;

const API_BASE: &str = "https://api.telegram.org";

/// Extra slack on top of the long-poll timeout before the HTTP client gives up.
const POLL_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// A client for one bot token.
pub struct TelegramClient {
    client: reqwest::blocking::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(bot_token: &str, poll_timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_base_url(API_BASE, bot_token, poll_timeout)
    }

    /// Points the client at a Bot API compatible server other than the
    /// public one (a local `telegram-bot-api` instance, for example).
    pub fn with_base_url(
        api_base: &str,
        bot_token: &str,
        poll_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(poll_timeout + POLL_GRACE)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Long-polls for updates after `offset`. Blocks up to the poll timeout
    /// when nothing is pending.
    pub fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, DeliveryError> {
        let mut query = vec![
            ("timeout", self.poll_timeout.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()?;
        let body: ApiResponse<Vec<Update>> = response.json()?;
        unwrap_api_response(body)
    }

    /// Drops updates that queued up while the bot was offline, so old
    /// commands are not replayed on start. Returns the next offset to use.
    pub fn skip_pending_updates(&self) -> Result<Option<i64>, DeliveryError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", "-1"), ("timeout", "0")])
            .send()?;
        let body: ApiResponse<Vec<Update>> = response.json()?;
        let updates = unwrap_api_response(body)?;
        Ok(updates.last().map(|u| u.update_id + 1))
    }

    pub fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError> {
        let payload = OutgoingMessage {
            chat_id: chat_id.0,
            text,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(POLL_GRACE)
            .json(&payload)
            .send()?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(DeliveryError::SendFailed(format!(
                "Telegram API returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

impl Notifier for TelegramClient {
    fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError> {
        self.send_message(chat_id, text)
    }
}

fn unwrap_api_response<T>(body: ApiResponse<T>) -> Result<T, DeliveryError> {
    match (body.ok, body.result) {
        (true, Some(result)) => Ok(result),
        _ => Err(DeliveryError::SendFailed(
            body.description
                .unwrap_or_else(|| "Telegram API returned ok=false".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_deserialize_and_ignore_unknown_fields() {
        let body = r#"{"ok": true, "result": [
            {"update_id": 901, "message": {"message_id": 5, "date": 1714568400,
                "chat": {"id": -100123, "type": "group"}, "text": "/set 25"}},
            {"update_id": 902, "edited_message": {"message_id": 5}}
        ]}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        let updates = unwrap_api_response(parsed).unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, -100123);
        assert_eq!(msg.text.as_deref(), Some("/set 25"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_api_error_surfaces_description() {
        let body = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        let err = unwrap_api_response(parsed).unwrap_err();
        assert_eq!(err.to_string(), "Failed to send message: Unauthorized");
    }

    #[test]
    fn test_method_url_embeds_token() {
        let client =
            TelegramClient::with_base_url("http://localhost:8081/", "123:abc", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.method_url("sendMessage"),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }
}
