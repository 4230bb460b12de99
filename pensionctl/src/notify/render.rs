//! Plain-text rendering of reservations and query results.
//!
//! Everything here is pure. Missing optional fields render as empty text rather than dropping
//! the line, so every message of a kind has the same shape.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::borrow::Cow;
use std::fmt::Write;

use crate::db::models::reservations::{PlatformStats, ReservationEvent, ReservationStatus};

/// How much of a reservation to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// Every field, including contact details and the guest's request
    Detailed,
    /// Status, platform, room, guest, check-in date and price
    Summary,
}

pub fn headline(status: &ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Confirmed => "📅 새로운 예약이 확정되었습니다!",
        ReservationStatus::Completed => "📅 새로운 예약이 완료되었습니다!",
        ReservationStatus::Canceled => "❌ 예약이 취소되었습니다.",
        ReservationStatus::Pending => "⏳ 새로운 예약이 입금대기 중입니다.",
        ReservationStatus::WaitlistCanceled => "❌ 예약대기(입금대기)가 취소되었습니다.",
        ReservationStatus::Alert => "🔔 새로운 예약 알림이 도착했습니다.",
        ReservationStatus::Unknown(_) => "❓ 예약 상태를 알 수 없습니다.",
    }
}

/// Format an amount as whole won with `,` grouping: `1234567` → `1,234,567원`.
///
/// `None` renders as `0원`.
pub fn format_price(amount: Option<Decimal>) -> String {
    let rounded = amount
        .unwrap_or_default()
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_string();
    let (negative, digits) = match rounded.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    if negative && digits.bytes().any(|b| b != b'0') {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.push('원');
    grouped
}

fn date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn date_time(day: Option<NaiveDate>, time: Option<&str>) -> String {
    format!("{} {}", date(day), time.unwrap_or_default()).trim().to_string()
}

fn request(event: &ReservationEvent) -> Option<&str> {
    event.request.as_deref().map(str::trim).filter(|r| !r.is_empty())
}

/// Bot API limit on the text of one message, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Cut `text` to at most `max` UTF-16 code units, marking the cut with `…`.
fn truncate(text: &str, max: usize) -> Cow<'_, str> {
    if utf16_len(text) <= max {
        return Cow::Borrowed(text);
    }

    let budget = max.saturating_sub(1);
    let mut used = 0;
    let mut end = 0;
    for (i, c) in text.char_indices() {
        if used + c.len_utf16() > budget {
            break;
        }
        used += c.len_utf16();
        end = i + c.len_utf8();
    }
    Cow::Owned(format!("{}…", &text[..end]))
}

/// Render one reservation as a notification.
pub fn render(event: &ReservationEvent, detail: Detail) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}\n", headline(&event.status));
    let _ = writeln!(text, "🆕 플랫폼: {}", event.platform);
    let _ = writeln!(text, "🔑 객실: {}", event.room_name.as_deref().unwrap_or_default());
    let _ = writeln!(text, "👤 게스트: {}", event.guest_name);

    match detail {
        Detail::Detailed => {
            let _ = writeln!(text, "📞 연락처: {}", event.guest_phone.as_deref().unwrap_or_default());
            let _ = writeln!(text, "🕒 체크인: {}", date_time(event.check_in_date, event.check_in_time.as_deref()));
            let _ = writeln!(text, "🕒 체크아웃: {}", date_time(event.check_out_date, event.check_out_time.as_deref()));
            let _ = writeln!(text, "💰 결제금액: {}", format_price(event.total_price));
            if let Some(request) = request(event) {
                // The free-text request is the only unbounded field; it gives way so the message fits
                let label = "💬 요청사항: ";
                let room = MAX_MESSAGE_LEN.saturating_sub(utf16_len(&text) + utf16_len(label) + 1);
                let _ = writeln!(text, "{label}{}", truncate(request, room));
            }
        }
        Detail::Summary => {
            let _ = writeln!(text, "🕒 체크인: {}", date(event.check_in_date));
            let _ = writeln!(text, "💰 결제금액: {}", format_price(event.total_price));
        }
    }

    text
}

/// Out-of-band notice sent when a cycle gives up.
pub fn error_notice(error: &impl std::fmt::Display) -> String {
    format!("⚠️ 예약 확인 중 오류가 발생했습니다: {error}")
}

/// Numbered listing of the reservations created today. Empty input is the caller's concern.
pub fn today_listing(rows: &[ReservationEvent]) -> String {
    let mut text = String::from("📅 오늘의 예약 정보:\n\n");
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(text, "{}. {} 예약", i + 1, row.platform);
        let _ = writeln!(text, "   ✔️예약상태: {}", row.status);
        let _ = writeln!(text, "   🔑 객실: {}", row.room_name.as_deref().unwrap_or_default());
        let _ = writeln!(text, "   👤 게스트: {}", row.guest_name);
        let _ = writeln!(text, "   📞 연락처: {}", row.guest_phone.as_deref().unwrap_or_default());
        let _ = writeln!(text, "   🕒 체크인: {}", date_time(row.check_in_date, row.check_in_time.as_deref()));
        let _ = writeln!(text, "   💰 결제금액: {}", format_price(row.total_price));
        if let Some(request) = request(row) {
            let _ = writeln!(text, "   💬 요청사항: {request}");
        }
        text.push('\n');
    }
    text
}

/// Per-platform statistics. `range` is the local date range the figures cover, `None` for all time.
pub fn stats_listing(stats: &[PlatformStats], range: Option<(NaiveDate, NaiveDate)>) -> String {
    let mut text = match range {
        Some((from, to)) => format!("📊 플랫폼별 예약 통계 ({} ~ {}):\n\n", date(Some(from)), date(Some(to))),
        None => String::from("📊 플랫폼별 예약 통계:\n\n"),
    };
    for stat in stats {
        let _ = writeln!(text, "{}", stat.platform);
        let _ = writeln!(text, "  예약 확정 수: {}", stat.confirmed);
        let _ = writeln!(text, "  예약 취소 수: {}", stat.canceled);
        let _ = writeln!(text, "  총 매출: {}\n", format_price(Some(stat.revenue)));
    }
    text
}

pub fn search_listing(rows: &[ReservationEvent]) -> String {
    let mut text = String::from("🔍 예약 검색 결과:\n\n");
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, row.platform);
        let _ = writeln!(text, "   예약번호: {}", row.reservation_number.as_deref().unwrap_or("없음"));
        let _ = writeln!(text, "   게스트: {}", row.guest_name);
        let _ = writeln!(text, "   연락처: {}", row.guest_phone.as_deref().unwrap_or("없음"));
        let _ = writeln!(text, "   체크인: {}", date(row.check_in_date));
        let _ = writeln!(text, "   체크아웃: {}", date(row.check_out_date));
        let _ = writeln!(text, "   예약상태: {}\n", row.status);
    }
    text
}
