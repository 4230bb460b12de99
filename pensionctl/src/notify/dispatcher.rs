//! Reservation announcements: poll, render, deliver, flag.
//!
//! ```text
//! run_dispatcher (interval loop, first tick immediate)
//!   └─ dispatcher.run_cycle()           // single flight: try_lock or Skipped
//!        ├─ store.list_unannounced()    // message_sent = false AND status in scope, id ASC
//!        └─ for each row, strictly one at a time:
//!             ├─ render(row, Detailed)
//!             ├─ retry.deliver()        // capped exponential backoff
//!             ├─ store.mark_announced() // UPDATE one row by id
//!             └─ sleep(pacing_delay)    // only between rows
//! ```
//!
//! A row is flagged only after the channel accepted its message, so a crash between the send and
//! the flag re-sends that one row on the next cycle. A failed delivery or flag stops the cycle:
//! later rows are never announced ahead of an earlier one, and the failed row is simply picked up
//! again next time.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use metrics::counter;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChatId, MessageChannel};
use crate::config::RetryConfig;
use crate::db::errors::DbError;
use crate::db::models::reservations::{ReservationEvent, ReservationId};
use crate::notify::delivery::{DeliveryError, RetryPolicy};
use crate::notify::render::{Detail, error_notice, render};
use crate::store::EventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    Completed { delivered: usize },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Polling or flagging failed; nothing past this point was announced
    #[error("reservation store error: {0}")]
    Store(#[from] DbError),

    #[error("reservation {reservation_id} could not be announced: {source}")]
    Delivery {
        reservation_id: ReservationId,
        #[source]
        source: DeliveryError,
    },
}

impl DispatchError {
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            DispatchError::Store(e) => e.is_unrecoverable(),
            DispatchError::Delivery { source, .. } => source.is_unrecoverable(),
        }
    }
}

#[derive(Builder)]
pub struct Dispatcher {
    store: Arc<dyn EventStore>,
    channel: Arc<dyn MessageChannel>,
    /// Chat that receives every announcement and error notice
    recipient: ChatId,
    #[builder(default = RetryPolicy::from(&RetryConfig::default()))]
    retry: RetryPolicy,
    #[builder(default = Duration::from_secs(10))]
    pacing_delay: Duration,
    #[builder(skip)]
    running: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    /// Announce every pending in-scope reservation, oldest first.
    ///
    /// Returns [`CycleOutcome::Skipped`] without touching the store if a cycle is already running.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, DispatchError> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::debug!("Previous dispatch cycle still running, skipping trigger");
            counter!("pensionctl_dispatch_cycles_total", "outcome" => "skipped").increment(1);
            return Ok(CycleOutcome::Skipped);
        };

        let pending = self.store.list_unannounced().await.inspect_err(|e| {
            counter!("pensionctl_dispatch_cycles_total", "outcome" => "poll_failed").increment(1);
            tracing::warn!(error = %e, "Failed to poll for unannounced reservations");
        })?;

        if pending.is_empty() {
            tracing::trace!("No reservations to announce");
            counter!("pensionctl_dispatch_cycles_total", "outcome" => "completed").increment(1);
            return Ok(CycleOutcome::Completed { delivered: 0 });
        }

        tracing::info!(count = pending.len(), "Found reservations to announce");

        for (index, event) in pending.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.pacing_delay).await;
            }

            if let Err(e) = self.announce(event).await {
                counter!("pensionctl_dispatch_cycles_total", "outcome" => "aborted").increment(1);
                tracing::error!(
                    reservation_id = event.id,
                    remaining = pending.len() - index,
                    error = %e,
                    "Dispatch cycle aborted"
                );
                self.send_error_notice(&e).await;
                return Err(e);
            }
        }

        counter!("pensionctl_dispatch_cycles_total", "outcome" => "completed").increment(1);
        Ok(CycleOutcome::Completed { delivered: pending.len() })
    }

    async fn announce(&self, event: &ReservationEvent) -> Result<(), DispatchError> {
        tracing::info!(reservation_id = event.id, status = %event.status, platform = %event.platform, "Announcing reservation");

        let text = render(event, Detail::Detailed);
        let attempts = match self.retry.deliver(self.channel.as_ref(), &self.recipient, &text).await {
            Ok(attempts) => attempts,
            Err(source) => {
                counter!("pensionctl_notifications_total", "outcome" => "failed").increment(1);
                return Err(DispatchError::Delivery {
                    reservation_id: event.id,
                    source,
                });
            }
        };
        counter!("pensionctl_notifications_total", "outcome" => "delivered").increment(1);

        if !self.store.mark_announced(event.id).await? {
            // Someone flagged it between our poll and now; the message still went out once
            tracing::warn!(reservation_id = event.id, "Reservation was already flagged as announced");
        }

        tracing::debug!(reservation_id = event.id, attempts, "Reservation announced");
        Ok(())
    }

    /// One plain send, no retry. Failures are logged and dropped.
    async fn send_error_notice(&self, error: &DispatchError) {
        if let Err(e) = self.channel.send_text(&self.recipient, &error_notice(error)).await {
            counter!("pensionctl_notifications_total", "outcome" => "notice_failed").increment(1);
            tracing::error!(error = %e, "Failed to send dispatch error notice");
        }
    }
}

/// Run a cycle now and then every `poll_interval` until `shutdown` fires.
///
/// Cycle failures are logged and retried on the next tick. Only an unrecoverable error (closed
/// pool, rejected bot token) ends the loop with an error.
pub async fn run_dispatcher(dispatcher: Arc<Dispatcher>, poll_interval: Duration, shutdown: CancellationToken) -> Result<(), DispatchError> {
    tracing::info!(?poll_interval, recipient = %dispatcher.recipient, "Starting reservation dispatcher");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Reservation dispatcher shutting down");
                return Ok(());
            }
        }

        // Dropping a cycle mid-way leaves at most the current row unflagged
        let result = tokio::select! {
            result = dispatcher.run_cycle() => result,
            _ = shutdown.cancelled() => {
                tracing::info!("Reservation dispatcher shutting down mid-cycle");
                return Ok(());
            }
        };

        match result {
            Ok(CycleOutcome::Completed { delivered }) if delivered > 0 => {
                tracing::info!(delivered, "Dispatch cycle completed");
            }
            Ok(_) => {}
            Err(e) if e.is_unrecoverable() => {
                tracing::error!(error = %e, "Unrecoverable dispatcher error, stopping");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch cycle failed, retrying on next tick");
            }
        }
    }
}
