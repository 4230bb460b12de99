//! Storage seams used by the dispatcher and the command handlers.
//!
//! [`EventStore`] carries the dispatcher's two query shapes (poll and flag). [`ReservationQueries`]
//! carries the read-only queries behind the chat commands. Both are implemented by [`PgStore`]
//! for production and [`InMemoryStore`] for tests.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use crate::db::errors::Result;
use crate::db::models::reservations::{CreatedWindow, PlatformStats, ReservationEvent, ReservationId, SearchFilter};

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Unannounced rows with an announced status, ordered by id ascending.
    async fn list_unannounced(&self) -> Result<Vec<ReservationEvent>>;

    /// Set the announced flag on exactly one row. Returns false if it was already set.
    async fn mark_announced(&self, id: ReservationId) -> Result<bool>;
}

/// Read-only queries. None of them touch the announced flag.
#[async_trait]
pub trait ReservationQueries: Send + Sync {
    async fn list_created_in(&self, window: CreatedWindow) -> Result<Vec<ReservationEvent>>;

    async fn platform_stats(&self, window: Option<CreatedWindow>) -> Result<Vec<PlatformStats>>;

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<ReservationEvent>>;
}
