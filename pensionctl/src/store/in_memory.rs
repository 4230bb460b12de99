//! In-memory store for tests and local runs without a database.
//!
//! Mirrors the SQL semantics of [`super::PgStore`]: the same filters, orderings and aggregates. It
//! also records every successful flag update and can be told to fail, so dispatcher behaviour
//! under store errors can be exercised.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::{EventStore, ReservationQueries};
use crate::db::errors::{DbError, Result};
use crate::db::models::reservations::{CreatedWindow, PlatformStats, ReservationEvent, ReservationId, ReservationStatus, SearchFilter};

#[derive(Default)]
struct State {
    rows: BTreeMap<ReservationId, ReservationEvent>,
    /// Ids in the order their flag was set
    announced_log: Vec<ReservationId>,
    fail_polls: usize,
    fail_marks: usize,
    polls: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ReservationEvent>) -> Self {
        let store = Self::new();
        for row in rows {
            store.insert(row);
        }
        store
    }

    /// Insert or replace a row, as the upstream aggregator would.
    pub fn insert(&self, row: ReservationEvent) {
        self.state.write().rows.insert(row.id, row);
    }

    pub fn get(&self, id: ReservationId) -> Option<ReservationEvent> {
        self.state.read().rows.get(&id).cloned()
    }

    pub fn is_announced(&self, id: ReservationId) -> bool {
        self.get(id).is_some_and(|row| row.announced)
    }

    /// Ids flagged so far, in flag order.
    pub fn announced_log(&self) -> Vec<ReservationId> {
        self.state.read().announced_log.clone()
    }

    /// Number of poll queries served (including failed ones).
    pub fn poll_count(&self) -> usize {
        self.state.read().polls
    }

    /// Make the next `n` polls fail with [`DbError::Unavailable`].
    pub fn fail_next_polls(&self, n: usize) {
        self.state.write().fail_polls = n;
    }

    /// Make the next `n` flag updates fail with [`DbError::Unavailable`].
    pub fn fail_next_marks(&self, n: usize) {
        self.state.write().fail_marks = n;
    }
}

fn unavailable() -> DbError {
    DbError::Unavailable {
        message: "in-memory store failure injected".to_string(),
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|value| value.to_lowercase().contains(needle))
}

fn matches_filter(row: &ReservationEvent, filter: &SearchFilter) -> bool {
    if let Some(keyword) = &filter.keyword {
        let needle = keyword.to_lowercase();
        let hit = contains_ignore_case(Some(&row.guest_name), &needle)
            || contains_ignore_case(row.reservation_number.as_deref(), &needle)
            || contains_ignore_case(row.guest_phone.as_deref(), &needle);
        if !hit {
            return false;
        }
    }

    if filter.platform.as_ref().is_some_and(|platform| *platform != row.platform) {
        return false;
    }

    if filter.status.as_ref().is_some_and(|status| status != row.status.as_db_str()) {
        return false;
    }

    if let Some((from, to)) = filter.check_in {
        match row.check_in_date {
            Some(date) if from <= date && date <= to => {}
            _ => return false,
        }
    }

    true
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn list_unannounced(&self) -> Result<Vec<ReservationEvent>> {
        let mut state = self.state.write();
        state.polls += 1;
        if state.fail_polls > 0 {
            state.fail_polls -= 1;
            return Err(unavailable());
        }

        // BTreeMap iteration is already id ascending
        Ok(state
            .rows
            .values()
            .filter(|row| !row.announced && row.status.is_announced())
            .cloned()
            .collect())
    }

    async fn mark_announced(&self, id: ReservationId) -> Result<bool> {
        let mut state = self.state.write();
        if state.fail_marks > 0 {
            state.fail_marks -= 1;
            return Err(unavailable());
        }

        let flipped = match state.rows.get_mut(&id) {
            Some(row) if !row.announced => {
                row.announced = true;
                true
            }
            _ => false,
        };
        if flipped {
            state.announced_log.push(id);
        }
        Ok(flipped)
    }
}

#[async_trait]
impl ReservationQueries for InMemoryStore {
    async fn list_created_in(&self, window: CreatedWindow) -> Result<Vec<ReservationEvent>> {
        let state = self.state.read();
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|row| window.contains(row.created_at) && row.status.is_announced())
            .cloned()
            .collect();

        // NULL check-in times sort last, as in Postgres
        rows.sort_by(|a, b| {
            a.platform
                .cmp(&b.platform)
                .then_with(|| a.check_in_time.is_none().cmp(&b.check_in_time.is_none()))
                .then_with(|| a.check_in_time.cmp(&b.check_in_time))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn platform_stats(&self, window: Option<CreatedWindow>) -> Result<Vec<PlatformStats>> {
        let state = self.state.read();
        let mut by_platform: HashMap<&str, PlatformStats> = HashMap::new();

        for row in state.rows.values() {
            if window.is_some_and(|w| !w.contains(row.created_at)) {
                continue;
            }

            let entry = by_platform.entry(row.platform.as_str()).or_insert_with(|| PlatformStats {
                platform: row.platform.clone(),
                confirmed: 0,
                canceled: 0,
                revenue: Decimal::ZERO,
            });
            let price = row.total_price.unwrap_or_default();

            if row.status.is_sold() {
                entry.confirmed += 1;
                entry.revenue += price;
            } else if row.status == ReservationStatus::Canceled {
                entry.canceled += 1;
                entry.revenue -= price;
            }
        }

        let mut stats: Vec<_> = by_platform.into_values().collect();
        stats.sort_by(|a, b| b.confirmed.cmp(&a.confirmed).then_with(|| a.platform.cmp(&b.platform)));
        Ok(stats)
    }

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<ReservationEvent>> {
        let state = self.state.read();
        let mut rows: Vec<_> = state.rows.values().filter(|row| matches_filter(row, filter)).cloned().collect();

        // check-in date descending with NULLs last, then newest id first
        rows.sort_by(|a, b| {
            a.check_in_date
                .is_none()
                .cmp(&b.check_in_date.is_none())
                .then_with(|| b.check_in_date.cmp(&a.check_in_date))
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(SearchFilter::LIMIT as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{event, event_with};
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    #[tokio::test]
    async fn test_poll_selects_announced_statuses_in_id_order() {
        let store = InMemoryStore::with_rows([
            event(9, ReservationStatus::Canceled),
            event(5, ReservationStatus::Confirmed),
            event(7, ReservationStatus::Alert),
            event(2, ReservationStatus::Pending),
            event(3, ReservationStatus::Completed),
        ]);

        let ids: Vec<_> = store.list_unannounced().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[tokio::test]
    async fn test_mark_is_single_row_and_one_way() {
        let store = InMemoryStore::with_rows([event(1, ReservationStatus::Confirmed), event(2, ReservationStatus::Confirmed)]);

        assert!(store.mark_announced(1).await.unwrap());
        assert!(!store.mark_announced(1).await.unwrap());
        assert!(!store.mark_announced(99).await.unwrap());

        assert!(store.is_announced(1));
        assert!(!store.is_announced(2));
        assert_eq!(store.announced_log(), vec![1]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryStore::with_rows([event(1, ReservationStatus::Confirmed)]);
        store.fail_next_polls(1);

        assert!(matches!(store.list_unannounced().await, Err(DbError::Unavailable { .. })));
        assert_eq!(store.list_unannounced().await.unwrap().len(), 1);
        assert_eq!(store.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_stats_net_revenue_per_platform() {
        let price = |won: i64| Some(Decimal::from(won));
        let store = InMemoryStore::with_rows([
            event_with(1, ReservationStatus::Confirmed, |r| {
                r.platform = "야놀자".into();
                r.total_price = price(100_000);
            }),
            event_with(2, ReservationStatus::Completed, |r| {
                r.platform = "야놀자".into();
                r.total_price = price(50_000);
            }),
            event_with(3, ReservationStatus::Canceled, |r| {
                r.platform = "야놀자".into();
                r.total_price = price(30_000);
            }),
            event_with(4, ReservationStatus::Confirmed, |r| {
                r.platform = "에어비앤비".into();
                r.total_price = None;
            }),
            event_with(5, ReservationStatus::Pending, |r| {
                r.platform = "에어비앤비".into();
                r.total_price = price(999);
            }),
        ]);

        let stats = store.platform_stats(None).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].platform, "야놀자");
        assert_eq!(stats[0].confirmed, 2);
        assert_eq!(stats[0].canceled, 1);
        assert_eq!(stats[0].revenue, Decimal::from(120_000));
        assert_eq!(stats[1].platform, "에어비앤비");
        assert_eq!(stats[1].confirmed, 1);
        assert_eq!(stats[1].revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_today_window_uses_local_date() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let store = InMemoryStore::with_rows([
            // 2024-06-01 08:00 KST
            event_with(1, ReservationStatus::Confirmed, |r| {
                r.created_at = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
            }),
            // 2024-05-31 23:00 KST
            event_with(2, ReservationStatus::Confirmed, |r| {
                r.created_at = Utc.with_ymd_and_hms(2024, 5, 31, 14, 0, 0).unwrap();
            }),
            event_with(3, ReservationStatus::Alert, |r| {
                r.created_at = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
            }),
        ]);

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let rows = store.list_created_in(CreatedWindow::local_dates(day, day, kst)).await.unwrap();

        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_search_filters_and_limit() {
        let date = |d: u32| NaiveDate::from_ymd_opt(2024, 6, d);
        let mut rows: Vec<_> = (1..=12)
            .map(|id| {
                event_with(id, ReservationStatus::Confirmed, |r| {
                    r.guest_name = format!("Guest {id}");
                    r.check_in_date = date(id as u32);
                })
            })
            .collect();
        rows.push(event_with(20, ReservationStatus::Canceled, |r| {
            r.guest_name = "kim minji".into();
            r.platform = "야놀자".into();
            r.check_in_date = date(15);
        }));
        let store = InMemoryStore::with_rows(rows);

        let all = store.search(&SearchFilter::default()).await.unwrap();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].id, 20);

        let by_keyword = store
            .search(&SearchFilter {
                keyword: Some("KIM".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_keyword.iter().map(|r| r.id).collect::<Vec<_>>(), vec![20]);

        let by_range = store
            .search(&SearchFilter {
                status: Some("예약확정".into()),
                check_in: Some((date(3).unwrap(), date(5).unwrap())),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_range.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 4, 3]);
    }
}
