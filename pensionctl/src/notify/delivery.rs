//! Retry with capped exponential backoff around a single channel send.

use std::time::Duration;
use thiserror::Error;

use crate::channel::{ChannelError, ChatId, MessageChannel};
use crate::config::RetryConfig;

#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Every attempt failed; carries the last channel error
    #[error("message not delivered after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ChannelError,
    },
}

impl DeliveryError {
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            DeliveryError::Exhausted { source, .. } => source.is_unrecoverable(),
        }
    }
}

/// Stateless between calls; one policy is shared by every delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: config.base_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .map_or(self.max_backoff, |factor| self.base_backoff.saturating_mul(factor))
            .min(self.max_backoff)
    }

    /// Send `text`, retrying failures until `max_attempts` is reached.
    ///
    /// Returns the number of attempts used. A permanent channel error (bad request, bad token)
    /// ends the loop early.
    pub async fn deliver(&self, channel: &dyn MessageChannel, chat: &ChatId, text: &str) -> Result<u32, DeliveryError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match channel.send_text(chat, text).await {
                Ok(()) => return Ok(attempt + 1),
                Err(e) => e,
            };

            let attempts = attempt + 1;
            if attempts >= max_attempts || error.is_permanent() {
                tracing::error!(%chat, attempts, error = %error, "Giving up on message delivery");
                return Err(DeliveryError::Exhausted { attempts, source: error });
            }

            let wait = self.backoff(attempt);
            tracing::warn!(
                %chat,
                attempt = attempts,
                max_attempts,
                backoff = ?wait,
                error = %error,
                "Message send failed, retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
