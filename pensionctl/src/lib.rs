//! # pensionctl: reservation notifications for guesthouse staff
//!
//! `pensionctl` watches the `reservations` table that an upstream booking aggregator fills from
//! several platforms (Airbnb, Yanolja, ...) and keeps the front desk informed over Telegram.
//!
//! ## Overview
//!
//! Three background services share one PostgreSQL pool and one Bot API client:
//!
//! - The **dispatcher** ([`notify`]) polls for rows that have not been announced yet, renders each
//!   one, delivers it with capped exponential backoff and flags the row as announced. Rows are
//!   sent strictly one at a time, oldest id first, with a pacing delay in between. When a row
//!   cannot be delivered the cycle stops and a short error notice is sent instead; the row is
//!   picked up again on the next cycle.
//! - The **update poller** ([`bot`]) long-polls the Bot API and answers the chat commands
//!   `/start`, `/today`, `/stats`, `/search` and `/help`, plus the inline keyboard behind
//!   `/start`. Data commands are restricted to an allow-list of chat ids.
//! - The **daily report** ([`reports`]) pushes the day's reservations to the notification chat at
//!   a fixed local time.
//!
//! A small HTTP server exposes `/healthz` and, when enabled, Prometheus metrics at
//! `/internal/metrics`.
//!
//! ## Delivery guarantees
//!
//! The `message_sent` flag is only set after the Bot API accepted the message, so every row in
//! scope is announced at least once. A crash between the send and the flag update re-sends that
//! single row. Cycles never overlap: a tick that fires while a cycle is still running is skipped.
//!
//! ## Failure handling
//!
//! Transient failures (database briefly unreachable, Bot API errors, timeouts) are logged and
//! retried on the next cycle. Unrecoverable ones (closed pool, rejected bot token) stop the
//! process with an error so a supervisor can restart it.
//!
//! ## Configuration
//!
//! See [`config`]. Values come from a YAML file, `PENSIONCTL_*` variables and the deployment
//! variables shared with the aggregator (`DATABASE_URL`, `TELEGRAM_BOT_TOKEN`, `BOT_CHAT_ID`,
//! `AUTHORIZED_USERS`).

pub mod bot;
pub mod channel;
pub mod config;
pub mod db;
pub mod errors;
pub mod notify;
pub mod reports;
pub mod store;
pub mod telegram;
pub mod telemetry;
#[cfg(test)]
mod test_utils;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, extract::State, routing::get};
use axum_prometheus::PrometheusMetricLayer;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, error, info, warn};

use crate::bot::{AllowList, Handlers, UpdatePoller, run_update_poller};
use crate::channel::{ChatId, MessageChannel};
use crate::db::errors::DbError;
use crate::notify::{Dispatcher, RetryPolicy, run_dispatcher};
use crate::reports::run_daily_report;
use crate::store::PgStore;
use crate::telegram::TelegramClient;

pub use config::Config;

/// Get the migrator for the `reservations` table
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect the pool and bring the schema up to date.
///
/// The table normally already exists (the aggregator owns it); the migration only creates what is
/// missing.
pub async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool_settings = &config.database.pool;
    let mut options = PgPoolOptions::new()
        .max_connections(pool_settings.max_connections)
        .min_connections(pool_settings.min_connections)
        .acquire_timeout(Duration::from_secs(pool_settings.acquire_timeout_secs));

    if pool_settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(pool_settings.idle_timeout_secs));
    }
    if pool_settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(pool_settings.max_lifetime_secs));
    }

    let pool = options.connect(&config.database.url).await?;
    migrator().run(&pool).await?;

    Ok(pool)
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}

/// Liveness plus database reachability
async fn healthz(State(state): State<AppState>) -> Result<&'static str, errors::Error> {
    sqlx::query("SELECT 1").execute(&state.db).await.map_err(DbError::from)?;
    Ok("OK")
}

pub fn build_router(state: AppState, enable_metrics: bool) -> Router {
    let mut router = Router::new().route("/healthz", get(healthz)).with_state(state);

    if enable_metrics {
        let (prometheus_layer, metric_handle): (_, PrometheusHandle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
    )
}

/// Background tasks running alongside the HTTP server: the dispatcher, the update poller and the
/// daily report.
///
/// [`shutdown`](BackgroundServices::shutdown) stops them and waits for them to finish. When
/// dropped, the `drop_guard` cancels the shutdown token.
pub struct BackgroundServices {
    background_tasks: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    /// Cancelled when a service hit an unrecoverable error or panicked
    fatal_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }

    pub fn fatal_token(&self) -> CancellationToken {
        self.fatal_token.clone()
    }
}

/// Run `task` on its own tokio task and watch it: an error or a panic is logged and trips `fatal`.
///
/// Services only return an error once they cannot continue, so every error is fatal here.
fn spawn_service<F, E>(name: &'static str, fatal: CancellationToken, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::spawn(task).await {
            Ok(Ok(())) => debug!(service = name, "Background service stopped"),
            Ok(Err(e)) => {
                error!(service = name, error = %e, "Background service failed, requesting shutdown");
                fatal.cancel();
            }
            Err(e) if e.is_panic() => {
                error!(service = name, "Background service panicked, requesting shutdown");
                fatal.cancel();
            }
            Err(_) => {}
        }
    })
}

/// Start the dispatcher, update poller and daily report as configured
pub fn setup_background_services(
    pool: PgPool,
    config: &Config,
    shutdown_token: CancellationToken,
) -> anyhow::Result<BackgroundServices> {
    let drop_guard = shutdown_token.clone().drop_guard();
    let fatal_token = CancellationToken::new();
    let mut background_tasks = Vec::new();

    let store = Arc::new(PgStore::new(pool));
    let client = TelegramClient::new(&config.telegram)?;
    let channel: Arc<dyn MessageChannel> = Arc::new(client.clone());
    let recipient = ChatId::from(config.telegram.chat_id.as_str());

    let allow_list = AllowList::new(&config.telegram.authorized_users);
    if allow_list.is_open() {
        warn!("telegram.authorized_users is empty, every chat may run data commands");
    }
    let handlers = Arc::new(Handlers::new(store.clone(), allow_list, config.utc_offset));

    if config.dispatcher.enabled {
        let dispatcher = Dispatcher::builder()
            .store(store.clone())
            .channel(channel.clone())
            .recipient(recipient.clone())
            .retry(RetryPolicy::from(&config.dispatcher.retry))
            .pacing_delay(config.dispatcher.pacing_delay)
            .build();
        let handle = spawn_service(
            "dispatcher",
            fatal_token.clone(),
            run_dispatcher(Arc::new(dispatcher), config.dispatcher.poll_interval, shutdown_token.clone()),
        );
        background_tasks.push(handle);
    } else {
        info!("Reservation dispatcher disabled");
    }

    if config.telegram.poll_updates {
        let poller = UpdatePoller::builder()
            .client(client)
            .handlers(handlers.clone())
            .error_backoff(config.telegram.error_backoff)
            .build();
        let handle = spawn_service("update_poller", fatal_token.clone(), run_update_poller(poller, shutdown_token.clone()));
        background_tasks.push(handle);
    }

    if config.daily_report.enabled {
        let report = run_daily_report(
            handlers,
            channel,
            recipient,
            config.daily_report.at,
            config.utc_offset,
            shutdown_token.clone(),
        );
        let handle = spawn_service("daily_report", fatal_token.clone(), async move {
            report.await;
            Ok::<(), errors::Error>(())
        });
        background_tasks.push(handle);
    }

    Ok(BackgroundServices {
        background_tasks,
        shutdown_token,
        fatal_token,
        drop_guard: Some(drop_guard),
    })
}

/// Main application struct that owns all resources
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            host = %config.host,
            port = config.port,
            dispatcher = config.dispatcher.enabled,
            poll_updates = config.telegram.poll_updates,
            daily_report = config.daily_report.enabled,
            "Starting pensionctl"
        );

        let pool = setup_database(&config).await?;

        let shutdown_token = CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), &config, shutdown_token)?;

        let router = build_router(AppState { db: pool.clone() }, config.enable_metrics);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Serve until `shutdown` resolves or a background service fails.
    ///
    /// Returns an error in the second case so the process exits non-zero and gets restarted.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("pensionctl listening on http://{}", bind_addr);

        let fatal = self.bg_services.fatal_token();
        let stop = {
            let fatal = fatal.clone();
            async move {
                tokio::select! {
                    _ = shutdown => {}
                    _ = fatal.cancelled() => {}
                }
            }
        };

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(stop)
            .await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        if fatal.is_cancelled() {
            anyhow::bail!("a background service failed with an unrecoverable error");
        }
        Ok(())
    }
}
