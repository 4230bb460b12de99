//! Long-polling loop feeding Bot API updates to the [`Handlers`].

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handlers::{CALLBACK_ACK, Handlers, Reply};
use crate::channel::ChatId;
use crate::errors::Error;
use crate::telegram::TelegramClient;
use crate::telegram::models::{CallbackQuery, Message, Update};

#[derive(Builder)]
pub struct UpdatePoller {
    client: TelegramClient,
    handlers: Arc<Handlers>,
    /// Pause after a failed `getUpdates` call
    #[builder(default = Duration::from_secs(5))]
    error_backoff: Duration,
}

impl UpdatePoller {
    async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat = ChatId::from(message.chat.id);
        debug!(
            %chat,
            from = message.from.as_ref().map(|u| u.display_name()),
            "Received message"
        );

        if let Some(reply) = self.handlers.on_message(&chat, text).await {
            self.reply(&chat, reply).await;
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        if let Err(e) = self.client.answer_callback_query(&callback.id, Some(CALLBACK_ACK)).await {
            warn!(error = %e, "Failed to answer callback query");
        }

        // Reply where the button was; fall back to the presser's private chat
        let chat = callback
            .message
            .as_ref()
            .map_or_else(|| ChatId::from(callback.from.id), |m| ChatId::from(m.chat.id));
        debug!(%chat, from = callback.from.display_name(), data = ?callback.data, "Received callback");

        let reply = self.handlers.on_callback(&chat, callback.data.as_deref().unwrap_or_default()).await;
        self.reply(&chat, reply).await;
    }

    async fn reply(&self, chat: &ChatId, reply: Reply) {
        match self.client.send_message(chat, &reply.text, reply.keyboard.as_ref()).await {
            Ok(_) => counter!("pensionctl_bot_replies_total", "outcome" => "sent").increment(1),
            Err(e) => {
                counter!("pensionctl_bot_replies_total", "outcome" => "failed").increment(1);
                warn!(%chat, error = %e, "Failed to send reply");
            }
        }
    }
}

/// Poll for updates until `shutdown` fires.
///
/// Transport and API errors are retried after `error_backoff`. Returns an error only when the bot
/// token is rejected.
#[instrument(skip_all)]
pub async fn run_update_poller(poller: UpdatePoller, shutdown: CancellationToken) -> Result<(), Error> {
    info!("Starting bot update poller");
    let mut offset = None;

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Bot update poller shutting down");
                return Ok(());
            }
            result = poller.client.get_updates(offset) => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    poller.handle_update(update).await;
                }
            }
            Err(e) if e.is_unrecoverable() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Failed to fetch bot updates, backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(poller.error_backoff) => {}
                }
            }
        }
    }
}
