//! Command and callback handling. Everything returns a [`Reply`]; sending it is the poller's job.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, Utc};

use super::auth::AllowList;
use super::commands::{self, Command, Input, SearchOptions, StatsPeriod};
use crate::channel::ChatId;
use crate::db::models::reservations::CreatedWindow;
use crate::errors::{Error, Result};
use crate::notify::render::{search_listing, stats_listing, today_listing};
use crate::store::ReservationQueries;
use crate::telegram::models::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const START: &str = "펜션 예약 관리 봇입니다. 아래 메뉴에서 원하는 기능을 선택하세요.";
pub const GREETING: &str = "안녕하세요! 펜션 예약 관리 봇입니다. 사용 가능한 명령어 목록을 보려면 /help 를 입력해주세요.";
pub const STATS_MENU: &str = "조회할 통계 기간을 선택하세요:";
pub const UNKNOWN_CALLBACK: &str = "알 수 없는 명령입니다.";
pub const NO_RESERVATIONS_TODAY: &str = "오늘 예약이 없습니다.";
pub const NO_STATS: &str = "예약 통계 정보가 없습니다.";
pub const NO_STATS_IN_PERIOD: &str = "선택한 기간에 예약 통계 정보가 없습니다.";
pub const NO_RESULTS: &str = "검색 결과가 없습니다.";

pub const HELP: &str = "펜션 예약 관리 봇 도움말

/start - 봇 시작 메시지 확인
/today - 오늘의 예약 정보 조회
/stats - 플랫폼별 예약 통계 조회
/stats [period] - 지정한 기간(today, week, month)의 플랫폼별 예약 통계 조회
/search [options] - 예약 검색
  옵션:
    keyword: 검색어 (게스트 이름, 예약번호, 전화번호)
    platform: 플랫폼명 (에어비앤비, 야놀자 등)
    status: 예약상태 (예약확정, 예약완료, 예약취소 등)
    startDate: 검색 시작일 (YYYY-MM-DD)
    endDate: 검색 종료일 (YYYY-MM-DD)
  예시: /search keyword:홍길동 platform:에어비앤비 status:예약확정 startDate:2023-06-01 endDate:2023-06-30

/help - 도움말 확인";

/// Acknowledgement shown on the button while a callback is handled
pub const CALLBACK_ACK: &str = "처리 중...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn menu(text: &str, rows: Vec<Vec<InlineKeyboardButton>>) -> Self {
        Self {
            text: text.to_string(),
            keyboard: Some(InlineKeyboardMarkup { inline_keyboard: rows }),
        }
    }
}

fn start_menu() -> Reply {
    Reply::menu(
        START,
        vec![
            vec![InlineKeyboardButton::callback("🔍 오늘의 예약 조회", "today")],
            vec![InlineKeyboardButton::callback("📊 예약 통계 조회", "stats")],
            vec![InlineKeyboardButton::callback("❓ 도움말", "help")],
        ],
    )
}

fn stats_menu() -> Reply {
    Reply::menu(
        STATS_MENU,
        vec![vec![
            InlineKeyboardButton::callback("오늘", "stats_today"),
            InlineKeyboardButton::callback("이번 주", "stats_week"),
            InlineKeyboardButton::callback("이번 달", "stats_month"),
            InlineKeyboardButton::callback("전체", "stats_all"),
        ]],
    )
}

pub struct Handlers {
    queries: Arc<dyn ReservationQueries>,
    allow_list: AllowList,
    utc_offset: FixedOffset,
}

impl Handlers {
    pub fn new(queries: Arc<dyn ReservationQueries>, allow_list: AllowList, utc_offset: FixedOffset) -> Self {
        Self {
            queries,
            allow_list,
            utc_offset,
        }
    }

    pub fn local_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    /// Handle a chat message. Unknown slash commands get no reply.
    pub async fn on_message(&self, chat: &ChatId, text: &str) -> Option<Reply> {
        match commands::parse(text) {
            Input::Command(command) => Some(self.run(chat, command).await),
            Input::Invalid(message) => Some(Reply::text(message)),
            Input::UnknownCommand => None,
            Input::Text => Some(Reply::text(GREETING)),
        }
    }

    /// Handle an inline keyboard button press.
    pub async fn on_callback(&self, chat: &ChatId, data: &str) -> Reply {
        let command = match data {
            "today" => Command::Today,
            "stats" => return stats_menu(),
            "stats_today" => Command::Stats(Some(StatsPeriod::Today)),
            "stats_week" => Command::Stats(Some(StatsPeriod::Week)),
            "stats_month" => Command::Stats(Some(StatsPeriod::Month)),
            "stats_all" => Command::Stats(None),
            "help" => Command::Help,
            _ => return Reply::text(UNKNOWN_CALLBACK),
        };
        self.run(chat, command).await
    }

    async fn run(&self, chat: &ChatId, command: Command) -> Reply {
        match self.execute(chat, &command).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    Error::Unauthorized { .. } => tracing::info!(%chat, ?command, "Rejected command from unauthorized chat"),
                    Error::BadRequest { .. } => tracing::debug!(%chat, error = %e, "Invalid command input"),
                    _ => tracing::error!(%chat, ?command, error = %e, "Command failed"),
                }
                Reply::text(e.user_message())
            }
        }
    }

    async fn execute(&self, chat: &ChatId, command: &Command) -> Result<Reply> {
        let text = match command {
            Command::Start => return Ok(start_menu()),
            Command::Help => return Ok(Reply::text(HELP)),
            Command::Today => {
                self.authorize(chat)?;
                self.today_text().await?
            }
            Command::Stats(period) => {
                self.authorize(chat)?;
                self.stats_text(*period).await?
            }
            Command::Search(options) => {
                self.authorize(chat)?;
                self.search_text(options).await?
            }
        };
        Ok(Reply::text(text))
    }

    fn authorize(&self, chat: &ChatId) -> Result<()> {
        if self.allow_list.allows(chat) {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                chat_id: chat.to_string(),
            })
        }
    }

    /// Listing of today's in-scope reservations, or the fixed empty text.
    pub async fn today_text(&self) -> Result<String> {
        let today = self.local_today();
        let rows = self
            .queries
            .list_created_in(CreatedWindow::local_dates(today, today, self.utc_offset))
            .await?;

        Ok(if rows.is_empty() {
            NO_RESERVATIONS_TODAY.to_string()
        } else {
            today_listing(&rows)
        })
    }

    async fn stats_text(&self, period: Option<StatsPeriod>) -> Result<String> {
        let range = period.map(|p| p.range(self.local_today()));
        let window = range.map(|(first, last)| CreatedWindow::local_dates(first, last, self.utc_offset));
        let stats = self.queries.platform_stats(window).await?;

        Ok(match (stats.is_empty(), range) {
            (true, Some(_)) => NO_STATS_IN_PERIOD.to_string(),
            (true, None) => NO_STATS.to_string(),
            (false, _) => stats_listing(&stats, range),
        })
    }

    async fn search_text(&self, options: &SearchOptions) -> Result<String> {
        let filter = options.to_filter()?;
        let rows = self.queries.search(&filter).await?;

        Ok(if rows.is_empty() {
            NO_RESULTS.to_string()
        } else {
            search_listing(&rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::db::models::reservations::{PlatformStats, ReservationEvent, ReservationStatus, SearchFilter};
    use crate::store::InMemoryStore;
    use crate::test_utils::event_with;
    use async_trait::async_trait;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn handlers(store: InMemoryStore, allowed: &[&str]) -> Handlers {
        Handlers::new(Arc::new(store), AllowList::new(allowed.iter().copied()), kst())
    }

    fn created_now(id: i64, status: ReservationStatus, guest: &str) -> ReservationEvent {
        event_with(id, status, |r| {
            r.guest_name = guest.to_string();
            r.created_at = Utc::now();
        })
    }

    struct BrokenStore;

    #[async_trait]
    impl ReservationQueries for BrokenStore {
        async fn list_created_in(&self, _: CreatedWindow) -> crate::db::errors::Result<Vec<ReservationEvent>> {
            Err(DbError::Other(anyhow::anyhow!("relation \"reservations\" does not exist")))
        }

        async fn platform_stats(&self, _: Option<CreatedWindow>) -> crate::db::errors::Result<Vec<PlatformStats>> {
            Err(DbError::PoolClosed)
        }

        async fn search(&self, _: &SearchFilter) -> crate::db::errors::Result<Vec<ReservationEvent>> {
            Err(DbError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_start_shows_menu_without_auth() {
        let handlers = handlers(InMemoryStore::new(), &["111"]);

        let reply = handlers.on_message(&ChatId::from(999), "/start").await.unwrap();

        assert_eq!(reply.text, START);
        let keyboard = reply.keyboard.unwrap();
        let data: Vec<_> = keyboard.inline_keyboard.iter().flatten().map(|b| b.callback_data.as_str()).collect();
        assert_eq!(data, vec!["today", "stats", "help"]);

        let help = handlers.on_message(&ChatId::from(999), "/help").await.unwrap();
        assert_eq!(help.text, HELP);
    }

    #[tokio::test]
    async fn test_data_commands_require_allow_list() {
        let store = InMemoryStore::with_rows([created_now(1, ReservationStatus::Confirmed, "Kim")]);
        let handlers = handlers(store, &["111"]);

        let denied = handlers.on_message(&ChatId::from(222), "/today").await.unwrap();
        assert_eq!(denied.text, "권한이 없습니다.");

        let denied = handlers.on_callback(&ChatId::from(222), "stats_week").await;
        assert_eq!(denied.text, "권한이 없습니다.");

        let allowed = handlers.on_message(&ChatId::from(111), "/today").await.unwrap();
        assert!(allowed.text.starts_with("📅 오늘의 예약 정보:"));
        assert!(allowed.text.contains("👤 게스트: Kim"));
    }

    #[tokio::test]
    async fn test_today_filters_scope_and_empty_text() {
        let handlers_empty = handlers(InMemoryStore::new(), &[]);
        let reply = handlers_empty.on_message(&ChatId::from(1), "/today").await.unwrap();
        assert_eq!(reply.text, NO_RESERVATIONS_TODAY);

        let store = InMemoryStore::with_rows([
            created_now(1, ReservationStatus::Pending, "Park"),
            created_now(2, ReservationStatus::Alert, "Choi"),
        ]);
        let reply = handlers(store, &[]).on_callback(&ChatId::from(1), "today").await;
        assert!(reply.text.contains("Park"));
        assert!(!reply.text.contains("Choi"));
    }

    #[tokio::test]
    async fn test_stats_periods() {
        let store = InMemoryStore::with_rows([
            created_now(1, ReservationStatus::Confirmed, "A"),
            event_with(2, ReservationStatus::Confirmed, |r| r.platform = "야놀자".into()),
        ]);
        let handlers = handlers(store, &[]);

        let all = handlers.on_message(&ChatId::from(1), "/stats").await.unwrap();
        assert!(all.text.starts_with("📊 플랫폼별 예약 통계:\n\n"));
        assert!(all.text.contains("야놀자"));
        assert!(all.text.contains("에어비앤비"));

        let today = handlers.on_callback(&ChatId::from(1), "stats_today").await;
        let date = handlers.local_today().format("%Y-%m-%d").to_string();
        assert!(today.text.starts_with(&format!("📊 플랫폼별 예약 통계 ({date} ~ {date}):")));
        assert!(today.text.contains("에어비앤비"));
        assert!(!today.text.contains("야놀자"));

        let invalid = handlers.on_message(&ChatId::from(1), "/stats yesterday").await.unwrap();
        assert_eq!(invalid.text, commands::INVALID_PERIOD);

        let empty = self::handlers(InMemoryStore::new(), &[]);
        assert_eq!(empty.on_callback(&ChatId::from(1), "stats_all").await.text, NO_STATS);
        assert_eq!(empty.on_callback(&ChatId::from(1), "stats_month").await.text, NO_STATS_IN_PERIOD);
    }

    #[tokio::test]
    async fn test_search_replies() {
        let store = InMemoryStore::with_rows([created_now(1, ReservationStatus::Canceled, "홍길동")]);
        let handlers = handlers(store, &[]);

        let hit = handlers.on_message(&ChatId::from(1), "/search 길동").await.unwrap();
        assert!(hit.text.starts_with("🔍 예약 검색 결과:"));
        assert!(hit.text.contains("게스트: 홍길동"));

        let miss = handlers.on_message(&ChatId::from(1), "/search keyword:없는사람").await.unwrap();
        assert_eq!(miss.text, NO_RESULTS);

        let bad_date = handlers
            .on_message(&ChatId::from(1), "/search startDate:2024-06-01 endDate:June")
            .await
            .unwrap();
        assert_eq!(bad_date.text, commands::INVALID_DATE);
    }

    #[tokio::test]
    async fn test_menus_greeting_and_unknown_input() {
        let handlers = handlers(InMemoryStore::new(), &[]);
        let chat = ChatId::from(1);

        let menu = handlers.on_callback(&chat, "stats").await;
        assert_eq!(menu.text, STATS_MENU);
        assert_eq!(menu.keyboard.unwrap().inline_keyboard[0].len(), 4);

        assert_eq!(handlers.on_callback(&chat, "help").await.text, HELP);
        assert_eq!(handlers.on_callback(&chat, "refund").await.text, UNKNOWN_CALLBACK);
        assert_eq!(handlers.on_message(&chat, "예약 있나요?").await.unwrap().text, GREETING);
        assert!(handlers.on_message(&chat, "/weather").await.is_none());
    }

    #[tokio::test]
    async fn test_store_errors_get_generic_reply() {
        let handlers = Handlers::new(Arc::new(BrokenStore), AllowList::default(), kst());
        let chat = ChatId::from(1);

        for reply in [
            handlers.on_message(&chat, "/today").await.unwrap(),
            handlers.on_message(&chat, "/stats").await.unwrap(),
            handlers.on_message(&chat, "/search kim").await.unwrap(),
        ] {
            assert_eq!(reply.text, "요청 처리 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.");
            assert!(!reply.text.contains("reservations"));
        }
    }
}
