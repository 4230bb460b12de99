//! Database repository for the `reservations` table.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::models::reservations::{CreatedWindow, PlatformStats, ReservationEvent, ReservationId, ReservationStatus, SearchFilter};

/// Columns selected for a [`ReservationEvent`]. `NaN` prices are read back as `NULL` so they decode.
const EVENT_COLUMNS: &str = "id, reservation_number, platform, reservation_status, final_room_name, final_guest_name, \
     guest_phone, final_check_in_date, check_in_time, final_check_out_date, check_out_time, \
     NULLIF(total_price, 'NaN') AS total_price, request, message_sent, created_at";

/// Repository for reservation queries.
///
/// The only write is [`Reservations::mark_announced`]; everything else is read-only.
pub struct Reservations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reservations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Rows not announced yet whose status is pushed proactively, oldest id first.
    #[instrument(skip(self), err)]
    pub async fn list_unannounced(&mut self) -> Result<Vec<ReservationEvent>> {
        let events = sqlx::query_as::<_, ReservationEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM reservations
            WHERE message_sent = false
              AND reservation_status = ANY($1)
            ORDER BY id ASC
            "#
        ))
        .bind(ReservationStatus::announced_labels())
        .fetch_all(&mut *self.db)
        .await?;

        Ok(events)
    }

    /// Flag one row as announced. Returns false when the row was missing or already flagged.
    #[instrument(skip(self), err)]
    pub async fn mark_announced(&mut self, id: ReservationId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET message_sent = true
            WHERE id = $1 AND message_sent = false
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Announced-status rows created inside `window`, grouped by platform then check-in time.
    #[instrument(skip(self), err)]
    pub async fn list_created_in(&mut self, window: CreatedWindow) -> Result<Vec<ReservationEvent>> {
        let events = sqlx::query_as::<_, ReservationEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM reservations
            WHERE created_at >= $1 AND created_at < $2
              AND reservation_status = ANY($3)
            ORDER BY platform, check_in_time NULLS LAST, id
            "#
        ))
        .bind(window.start)
        .bind(window.end)
        .bind(ReservationStatus::announced_labels())
        .fetch_all(&mut *self.db)
        .await?;

        Ok(events)
    }

    /// Per-platform sold/canceled counts and net revenue, optionally limited to a creation window.
    #[instrument(skip(self), err)]
    pub async fn platform_stats(&mut self, window: Option<CreatedWindow>) -> Result<Vec<PlatformStats>> {
        let stats = stats_query(window)
            .build_query_as::<PlatformStats>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(stats)
    }

    /// Free-form search, newest check-in first, at most [`SearchFilter::LIMIT`] rows.
    #[instrument(skip(self), err)]
    pub async fn search(&mut self, filter: &SearchFilter) -> Result<Vec<ReservationEvent>> {
        let events = search_query(filter)
            .build_query_as::<ReservationEvent>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(events)
    }
}

fn stats_query(window: Option<CreatedWindow>) -> QueryBuilder<'static, Postgres> {
    let canceled = ReservationStatus::Canceled.as_db_str().to_string();
    let price = "COALESCE(NULLIF(total_price, 'NaN'), 0)";

    let mut query = QueryBuilder::new("SELECT platform, COUNT(*) FILTER (WHERE reservation_status = ANY(");
    query.push_bind(ReservationStatus::sold_labels());
    query.push(")) AS confirmed_reservations, COUNT(*) FILTER (WHERE reservation_status = ");
    query.push_bind(canceled.clone());
    query.push(") AS canceled_reservations, COALESCE(SUM(CASE WHEN reservation_status = ANY(");
    query.push_bind(ReservationStatus::sold_labels());
    query.push(format!(") THEN {price} WHEN reservation_status = "));
    query.push_bind(canceled);
    query.push(format!(" THEN -{price} ELSE 0 END), 0) AS total_revenue FROM reservations WHERE 1=1"));

    if let Some(window) = window {
        query.push(" AND created_at >= ");
        query.push_bind(window.start);
        query.push(" AND created_at < ");
        query.push_bind(window.end);
    }

    query.push(" GROUP BY platform ORDER BY confirmed_reservations DESC, platform");
    query
}

fn search_query(filter: &SearchFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM reservations WHERE 1=1"));

    if let Some(keyword) = &filter.keyword {
        let pattern = format!("%{}%", escape_like(keyword));
        query.push(" AND (final_guest_name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR reservation_number ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR guest_phone ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }

    if let Some(platform) = &filter.platform {
        query.push(" AND platform = ");
        query.push_bind(platform.clone());
    }

    if let Some(status) = &filter.status {
        query.push(" AND reservation_status = ");
        query.push_bind(status.clone());
    }

    if let Some((from, to)) = filter.check_in {
        query.push(" AND final_check_in_date BETWEEN ");
        query.push_bind(from);
        query.push(" AND ");
        query.push_bind(to);
    }

    query.push(" ORDER BY final_check_in_date DESC NULLS LAST, id DESC LIMIT ");
    query.push_bind(SearchFilter::LIMIT);
    query
}

/// Escape `%`, `_` and `\` so user input matches literally inside an ILIKE pattern.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
