//! The outbound message channel seen by the dispatcher and the daily report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Telegram chat identifier, kept as text since it is configured and compared as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId(id.to_string())
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        ChatId(id.trim().to_string())
    }
}

/// A single failed call to the channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The request never produced a usable response (connect, timeout, malformed body)
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered with `ok: false`
    #[error("Bot API error {code:?}: {description}")]
    Api { code: Option<i64>, description: String },
}

impl ChannelError {
    /// Invalid or revoked bot token. Retrying will not help.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, ChannelError::Api { code: Some(401 | 404), .. })
    }

    /// The Bot API refused this request and will refuse it again (bad request, blocked chat, bad
    /// token). 429 and 5xx are not permanent.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ChannelError::Api { code: Some(400 | 401 | 403 | 404), .. })
    }
}

/// Push channel to a human operator. Each call may fail independently.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), ChannelError>;
}
