//! Minimal Telegram Bot API client.
//!
//! Covers the four methods the bot uses: `sendMessage`, `getUpdates`, `answerCallbackQuery`, and
//! `sendMessage` with an inline keyboard. Every call is a JSON `POST` to
//! `{api_url}/bot{token}/{method}`. The token is part of the URL, so URLs are stripped from
//! transport errors before they can reach a log line.

pub mod models;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::channel::{ChannelError, ChatId, MessageChannel};
use crate::config::TelegramConfig;
use models::{
    AnswerCallbackQueryParams, ApiResponse, GetUpdatesParams, InlineKeyboardMarkup, Message, SendMessageParams, Update,
};

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_url}/bot{token}`, no trailing slash
    endpoint: String,
    request_timeout: Duration,
    long_poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        // reqwest is built without a bundled rustls provider; a no-op if one is already installed
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", config.api_url.as_str().trim_end_matches('/'), config.bot_token),
            request_timeout: config.request_timeout,
            long_poll_timeout: config.long_poll_timeout,
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: &P, timeout: Option<Duration>) -> Result<R, ChannelError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(format!("{}/{method}", self.endpoint)).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| ChannelError::Http(e.without_url()))?;
        let status = response.status();

        // The Bot API sends the envelope for error statuses too
        let envelope: ApiResponse<R> = response.json().await.map_err(|e| ChannelError::Http(e.without_url()))?;

        match envelope {
            ApiResponse {
                ok: true, result: Some(result), ..
            } => Ok(result),
            ApiResponse {
                error_code, description, ..
            } => {
                let code = error_code.or_else(|| (!status.is_success()).then(|| i64::from(status.as_u16())));
                tracing::debug!(method, ?code, "Bot API call rejected");
                Err(ChannelError::Api {
                    code,
                    description: description.unwrap_or_else(|| format!("{method} returned no result")),
                })
            }
        }
    }

    pub async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, ChannelError> {
        let params = SendMessageParams {
            chat_id: chat.as_str(),
            text,
            reply_markup: keyboard,
        };
        self.call("sendMessage", &params, None).await
    }

    /// Long-poll for updates after `offset`. Blocks server-side for up to `long_poll_timeout`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ChannelError> {
        let params = GetUpdatesParams {
            offset,
            timeout: self.long_poll_timeout.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        // The HTTP timeout has to outlast the server-side hold
        let timeout = self.request_timeout + self.long_poll_timeout;
        self.call("getUpdates", &params, Some(timeout)).await
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>) -> Result<(), ChannelError> {
        let params = AnswerCallbackQueryParams { callback_query_id, text };
        self.call::<_, bool>("answerCallbackQuery", &params, None).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for TelegramClient {
    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), ChannelError> {
        self.send_message(chat, text, None).await.map(|_| ())
    }
}
