//! Telegram long-polling loop.
//!
//! Fetches updates, hands message text to the `CommandHandler`, sends the
//! reply. Runs on the main thread; chat tickers run on their own threads.

use std::thread;
use std::time::Duration;

use crate::commands::CommandHandler;
use crate::logging::{self, Component};
use crate::model::ChatId;
use crate::notify::telegram::{TelegramClient, Update};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct Bot<'a> {
    telegram: &'a TelegramClient,
    handler: CommandHandler,
    offset: Option<i64>,
}

impl<'a> Bot<'a> {
    pub fn new(telegram: &'a TelegramClient, handler: CommandHandler) -> Self {
        Self {
            telegram,
            handler,
            offset: None,
        }
    }

    /// Polls forever. Commands sent while the bot was down are dropped
    /// rather than replayed.
    pub fn run(&mut self) -> ! {
        match self.telegram.skip_pending_updates() {
            Ok(offset) => self.offset = offset,
            Err(e) => logging::warn(
                Component::Telegram,
                None,
                &format!("could not drop pending updates: {}", e),
            ),
        }

        logging::info(Component::Telegram, None, "Bot is running");

        loop {
            match self.telegram.get_updates(self.offset) {
                Ok(updates) => {
                    for update in updates {
                        self.dispatch(update);
                    }
                }
                Err(e) => {
                    logging::warn(Component::Telegram, None, &format!("getUpdates failed: {}", e));
                    thread::sleep(POLL_ERROR_BACKOFF);
                }
            }
        }
    }

    fn dispatch(&mut self, update: Update) {
        self.offset = Some(update.update_id + 1);

        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text else {
            return;
        };
        let chat_id = ChatId(message.chat.id);

        if let Some(reply) = self.handler.handle(chat_id, &text) {
            if let Err(e) = self.telegram.send_message(chat_id, &reply) {
                logging::error(
                    Component::Telegram,
                    Some(&chat_id.to_string()),
                    &format!("reply failed: {}", e),
                );
            }
        }
    }
}
