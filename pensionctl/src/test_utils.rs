//! Shared fakes and fixtures for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::channel::{ChannelError, ChatId, MessageChannel};
use crate::db::models::reservations::{ReservationEvent, ReservationId, ReservationStatus};

/// A row as the aggregator would insert it: unannounced, with every optional field filled.
pub fn event(id: ReservationId, status: ReservationStatus) -> ReservationEvent {
    ReservationEvent {
        id,
        reservation_number: Some(format!("R-{id:05}")),
        platform: "에어비앤비".to_string(),
        status,
        room_name: Some("별채 101".to_string()),
        guest_name: format!("게스트{id}"),
        guest_phone: Some("010-1234-5678".to_string()),
        check_in_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        check_in_time: Some("15:00".to_string()),
        check_out_date: NaiveDate::from_ymd_opt(2024, 6, 2),
        check_out_time: Some("11:00".to_string()),
        total_price: Some(Decimal::from(120_000)),
        request: None,
        announced: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, 20, 3, 0, 0).unwrap(),
    }
}

pub fn event_with(id: ReservationId, status: ReservationStatus, edit: impl FnOnce(&mut ReservationEvent)) -> ReservationEvent {
    let mut row = event(id, status);
    edit(&mut row);
    row
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub chat: ChatId,
    pub text: String,
    pub at: Instant,
    pub delivered: bool,
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Never,
    FirstN(usize),
    Always,
    RejectToken,
    RejectMessage,
}

/// Channel fake that records every send attempt and fails on demand.
pub struct RecordingChannel {
    attempts: Mutex<Vec<Attempt>>,
    mode: Mutex<FailureMode>,
    latency: Duration,
}

impl RecordingChannel {
    fn with_mode(mode: FailureMode) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            mode: Mutex::new(mode),
            latency: Duration::ZERO,
        }
    }

    pub fn new() -> Self {
        Self::with_mode(FailureMode::Never)
    }

    /// Every send fails with a transient Bot API error.
    pub fn failing() -> Self {
        Self::with_mode(FailureMode::Always)
    }

    pub fn failing_first(n: usize) -> Self {
        Self::with_mode(FailureMode::FirstN(n))
    }

    /// Every send fails with 401, as with a revoked token.
    pub fn rejecting_token() -> Self {
        Self::with_mode(FailureMode::RejectToken)
    }

    /// Every send fails with 400, as with an oversized message.
    pub fn rejecting_message() -> Self {
        Self::with_mode(FailureMode::RejectMessage)
    }

    /// Each send takes `latency` before it completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn recover(&self) {
        *self.mode.lock() = FailureMode::Never;
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }

    /// Texts that were accepted by the channel, in order.
    pub fn delivered(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.delivered)
            .map(|a| a.text.clone())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), ChannelError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = {
            let mut mode = self.mode.lock();
            match *mode {
                FailureMode::Never => Ok(()),
                FailureMode::FirstN(0) => {
                    *mode = FailureMode::Never;
                    Ok(())
                }
                FailureMode::FirstN(n) => {
                    *mode = FailureMode::FirstN(n - 1);
                    Err(502)
                }
                FailureMode::Always => Err(502),
                FailureMode::RejectToken => Err(401),
                FailureMode::RejectMessage => Err(400),
            }
        };

        self.attempts.lock().push(Attempt {
            chat: chat.clone(),
            text: text.to_string(),
            at: Instant::now(),
            delivered: outcome.is_ok(),
        });

        outcome.map_err(|code| ChannelError::Api {
            code: Some(code),
            description: match code {
                400 => "Bad Request: message is too long",
                401 => "Unauthorized",
                _ => "Bad Gateway",
            }
            .to_string(),
        })
    }
}
