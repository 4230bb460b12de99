//! Database models for reservation rows and the aggregates computed over them.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::fmt;

pub type ReservationId = i64;

/// Reservation status as written by the aggregator.
///
/// The aggregator stores Korean labels; anything it may add later ends up in `Unknown` with the
/// raw label preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReservationStatus {
    /// `예약대기`: booked, awaiting the deposit
    Pending,
    /// `예약확정`
    Confirmed,
    /// `예약완료`
    Completed,
    /// `예약취소`
    Canceled,
    /// `예약대기취소`: a booking awaiting deposit was dropped
    WaitlistCanceled,
    /// `예약알림`
    Alert,
    Unknown(String),
}

impl ReservationStatus {
    /// Statuses pushed proactively by the dispatcher.
    pub const ANNOUNCED: [ReservationStatus; 3] = [ReservationStatus::Pending, ReservationStatus::Confirmed, ReservationStatus::Canceled];

    /// Statuses counted as a sale in platform statistics.
    pub const SOLD: [ReservationStatus; 2] = [ReservationStatus::Confirmed, ReservationStatus::Completed];

    pub fn as_db_str(&self) -> &str {
        match self {
            ReservationStatus::Pending => "예약대기",
            ReservationStatus::Confirmed => "예약확정",
            ReservationStatus::Completed => "예약완료",
            ReservationStatus::Canceled => "예약취소",
            ReservationStatus::WaitlistCanceled => "예약대기취소",
            ReservationStatus::Alert => "예약알림",
            ReservationStatus::Unknown(raw) => raw,
        }
    }

    pub fn from_db(raw: &str) -> Self {
        match raw.trim() {
            "예약대기" => ReservationStatus::Pending,
            "예약확정" => ReservationStatus::Confirmed,
            "예약완료" => ReservationStatus::Completed,
            "예약취소" => ReservationStatus::Canceled,
            "예약대기취소" => ReservationStatus::WaitlistCanceled,
            "예약알림" => ReservationStatus::Alert,
            other => ReservationStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_announced(&self) -> bool {
        Self::ANNOUNCED.contains(self)
    }

    pub fn is_sold(&self) -> bool {
        Self::SOLD.contains(self)
    }

    /// DB labels of the announced statuses, ready to bind as a `text[]`.
    pub fn announced_labels() -> Vec<String> {
        Self::ANNOUNCED.iter().map(|s| s.as_db_str().to_string()).collect()
    }

    pub fn sold_labels() -> Vec<String> {
        Self::SOLD.iter().map(|s| s.as_db_str().to_string()).collect()
    }
}

impl From<String> for ReservationStatus {
    fn from(raw: String) -> Self {
        ReservationStatus::from_db(&raw)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// One row of the `reservations` table.
///
/// Column names follow the aggregator's schema; `message_sent` is the "announced" flag.
#[derive(Debug, Clone, FromRow)]
pub struct ReservationEvent {
    pub id: ReservationId,
    pub reservation_number: Option<String>,
    pub platform: String,
    #[sqlx(rename = "reservation_status", try_from = "String")]
    pub status: ReservationStatus,
    #[sqlx(rename = "final_room_name")]
    pub room_name: Option<String>,
    #[sqlx(rename = "final_guest_name")]
    pub guest_name: String,
    pub guest_phone: Option<String>,
    #[sqlx(rename = "final_check_in_date")]
    pub check_in_date: Option<NaiveDate>,
    pub check_in_time: Option<String>,
    #[sqlx(rename = "final_check_out_date")]
    pub check_out_date: Option<NaiveDate>,
    pub check_out_time: Option<String>,
    /// `NULL` (and `NaN`, which the queries read back as `NULL`) renders as zero
    pub total_price: Option<Decimal>,
    pub request: Option<String>,
    #[sqlx(rename = "message_sent")]
    pub announced: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-platform aggregate returned by the statistics query.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PlatformStats {
    pub platform: String,
    #[sqlx(rename = "confirmed_reservations")]
    pub confirmed: i64,
    #[sqlx(rename = "canceled_reservations")]
    pub canceled: i64,
    /// Sold amounts minus canceled amounts
    #[sqlx(rename = "total_revenue")]
    pub revenue: Decimal,
}

/// Half-open `[start, end)` window on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CreatedWindow {
    /// Every instant whose local date (at `offset`) lies in `first..=last`.
    pub fn local_dates(first: NaiveDate, last: NaiveDate, offset: FixedOffset) -> Self {
        let midnight = |date: NaiveDate| date.and_time(NaiveTime::MIN) - offset;
        let end = last.succ_opt().map_or(DateTime::<Utc>::MAX_UTC, |next| midnight(next).and_utc());
        Self {
            start: midnight(first).and_utc(),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Filters accepted by the reservation search. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Case-insensitive substring of guest name, reservation number or phone
    pub keyword: Option<String>,
    pub platform: Option<String>,
    /// Raw status label, compared exactly
    pub status: Option<String>,
    /// Inclusive check-in date range
    pub check_in: Option<(NaiveDate, NaiveDate)>,
}

impl SearchFilter {
    /// Maximum number of rows a search returns
    pub const LIMIT: i64 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_round_trip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Canceled,
            ReservationStatus::WaitlistCanceled,
            ReservationStatus::Alert,
        ] {
            assert_eq!(ReservationStatus::from_db(status.as_db_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_keeps_label() {
        let status = ReservationStatus::from("체크아웃".to_string());
        assert_eq!(status, ReservationStatus::Unknown("체크아웃".to_string()));
        assert_eq!(status.to_string(), "체크아웃");
        assert!(!status.is_announced());
    }

    #[test]
    fn test_local_date_window() {
        use chrono::TimeZone;

        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let window = CreatedWindow::local_dates(day, day, kst);

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 5, 31, 15, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 5, 31, 15, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap()));
    }

    #[test]
    fn test_announced_set() {
        assert!(ReservationStatus::Pending.is_announced());
        assert!(ReservationStatus::Confirmed.is_announced());
        assert!(ReservationStatus::Canceled.is_announced());
        assert!(!ReservationStatus::Completed.is_announced());
        assert!(!ReservationStatus::WaitlistCanceled.is_announced());
        assert!(!ReservationStatus::Alert.is_announced());
        assert_eq!(ReservationStatus::announced_labels(), vec!["예약대기", "예약확정", "예약취소"]);
    }
}
