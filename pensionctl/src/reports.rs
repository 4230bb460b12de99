//! Daily "today's reservations" push to the notification chat.

use std::sync::Arc;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, Utc};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::bot::Handlers;
use crate::channel::{ChatId, MessageChannel};
use crate::errors::Result;

/// First instant strictly after `now` whose local time (at `offset`) is `at`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut fire = local_now.date().and_time(at);
    if fire <= local_now {
        fire = fire.checked_add_days(Days::new(1)).unwrap_or(fire);
    }
    (fire - offset).and_utc()
}

/// Fire time after the report scheduled at `fired` went out.
///
/// Counts from the later of `fired` and `now`, so a wall clock still short of `fired` when the
/// timer wakes up cannot schedule the same instant twice.
pub fn fire_after(fired: DateTime<Utc>, now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    next_fire(fired.max(now), at, offset)
}

/// Send one report. Always sends something: the listing or the empty-day text.
pub async fn send_report(handlers: &Handlers, channel: &dyn MessageChannel, chat: &ChatId) -> Result<()> {
    let text = handlers.today_text().await?;
    channel.send_text(chat, &text).await?;
    Ok(())
}

/// Send the report every day at `at` local time until `shutdown` fires. Failures are logged and
/// the next day's report is attempted as usual.
#[instrument(skip_all, fields(%at))]
pub async fn run_daily_report(
    handlers: Arc<Handlers>,
    channel: Arc<dyn MessageChannel>,
    chat: ChatId,
    at: NaiveTime,
    offset: FixedOffset,
    shutdown: CancellationToken,
) {
    let mut fire = next_fire(Utc::now(), at, offset);
    loop {
        info!(next = %fire.with_timezone(&offset), "Scheduled daily report");
        let wait = (fire - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Daily report shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        match send_report(&handlers, channel.as_ref(), &chat).await {
            Ok(()) => counter!("pensionctl_daily_reports_total", "outcome" => "sent").increment(1),
            Err(e) => {
                counter!("pensionctl_daily_reports_total", "outcome" => "failed").increment(1);
                error!(error = %e, "Failed to send daily report");
            }
        }

        fire = fire_after(fire, Utc::now(), at, offset);
    }
}
