//! PostgreSQL-backed store.
//!
//! Each call checks a connection out of the pool for the duration of one statement, so nothing
//! holds a connection across the dispatcher's backoff or pacing waits.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{EventStore, ReservationQueries};
use crate::db::errors::Result;
use crate::db::handlers::Reservations;
use crate::db::models::reservations::{CreatedWindow, PlatformStats, ReservationEvent, ReservationId, SearchFilter};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn list_unannounced(&self) -> Result<Vec<ReservationEvent>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).list_unannounced().await
    }

    async fn mark_announced(&self, id: ReservationId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).mark_announced(id).await
    }
}

#[async_trait]
impl ReservationQueries for PgStore {
    async fn list_created_in(&self, window: CreatedWindow) -> Result<Vec<ReservationEvent>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).list_created_in(window).await
    }

    async fn platform_stats(&self, window: Option<CreatedWindow>) -> Result<Vec<PlatformStats>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).platform_stats(window).await
    }

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<ReservationEvent>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).search(filter).await
    }
}
