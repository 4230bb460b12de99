//! Slash-command parsing.

use chrono::{Days, NaiveDate};
use std::str::FromStr;

use crate::db::models::reservations::SearchFilter;
use crate::errors::Error;

pub const INVALID_PERIOD: &str = "잘못된 기간 옵션입니다. today, week, month 중 하나를 선택해주세요.";
pub const INVALID_DATE: &str = "잘못된 날짜 형식입니다. YYYY-MM-DD 형식으로 입력해주세요.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Today,
    /// `None` is all time
    Stats(Option<StatsPeriod>),
    Search(SearchOptions),
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Today,
    Week,
    Month,
}

impl StatsPeriod {
    /// Inclusive local date range ending on `today`.
    pub fn range(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let days = match self {
            StatsPeriod::Today => 0,
            StatsPeriod::Week => 7,
            StatsPeriod::Month => 30,
        };
        (today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN), today)
    }
}

impl FromStr for StatsPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(StatsPeriod::Today),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            _ => Err(Error::BadRequest {
                message: INVALID_PERIOD.to_string(),
            }),
        }
    }
}

/// Raw `/search` options, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub keyword: Option<String>,
    pub platform: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl SearchOptions {
    /// Parse `key:value` tokens. Words without a known key are joined into the keyword.
    pub fn parse(args: &str) -> Self {
        let mut options = SearchOptions::default();
        let mut bare_words = Vec::new();

        for token in args.split_whitespace() {
            let slot = match token.split_once(':') {
                Some(("keyword", value)) => Some((&mut options.keyword, value)),
                Some(("platform", value)) => Some((&mut options.platform, value)),
                Some(("status", value)) => Some((&mut options.status, value)),
                Some(("startDate", value)) => Some((&mut options.start_date, value)),
                Some(("endDate", value)) => Some((&mut options.end_date, value)),
                _ => None,
            };

            match slot {
                Some((_, "")) => {}
                Some((field, value)) => *field = Some(value.to_string()),
                None => bare_words.push(token),
            }
        }

        if !bare_words.is_empty() {
            let joined = bare_words.join(" ");
            options.keyword = Some(match options.keyword.take() {
                Some(keyword) => format!("{keyword} {joined}"),
                None => joined,
            });
        }

        options
    }

    /// Validate dates and build the store filter. The date range applies only when both ends are given.
    pub fn to_filter(&self) -> Result<SearchFilter, Error> {
        let parse = |raw: &Option<String>| -> Result<Option<NaiveDate>, Error> {
            raw.as_deref()
                .map(|value| {
                    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| Error::BadRequest {
                        message: INVALID_DATE.to_string(),
                    })
                })
                .transpose()
        };
        let start = parse(&self.start_date)?;
        let end = parse(&self.end_date)?;

        Ok(SearchFilter {
            keyword: self.keyword.clone(),
            platform: self.platform.clone(),
            status: self.status.clone(),
            check_in: start.zip(end),
        })
    }
}

/// Result of reading a chat message.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    /// A known command with arguments that do not parse
    Invalid(String),
    /// Starts with `/` but is not one of ours
    UnknownCommand,
    Text,
}

pub fn parse(text: &str) -> Input {
    let text = text.trim();
    let Some(body) = text.strip_prefix('/') else {
        return Input::Text;
    };

    let (head, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    // `/stats@pension_bot` in group chats
    let name = head.split_once('@').map_or(head, |(name, _)| name);
    let args = args.trim();

    let command = match name {
        "start" => Command::Start,
        "today" => Command::Today,
        "help" => Command::Help,
        "stats" if args.is_empty() => Command::Stats(None),
        "stats" => match args.parse::<StatsPeriod>() {
            Ok(period) => Command::Stats(Some(period)),
            Err(e) => return Input::Invalid(e.user_message()),
        },
        "search" => Command::Search(SearchOptions::parse(args)),
        _ => return Input::UnknownCommand,
    };

    Input::Command(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("/start"), Input::Command(Command::Start));
        assert_eq!(parse("  /today "), Input::Command(Command::Today));
        assert_eq!(parse("/help@pension_bot"), Input::Command(Command::Help));
        assert_eq!(parse("/stats"), Input::Command(Command::Stats(None)));
        assert_eq!(parse("/stats week"), Input::Command(Command::Stats(Some(StatsPeriod::Week))));
        assert_eq!(parse("/stats@pension_bot Month"), Input::Command(Command::Stats(Some(StatsPeriod::Month))));
    }

    #[test]
    fn test_invalid_and_foreign_input() {
        assert_eq!(parse("/stats year"), Input::Invalid(INVALID_PERIOD.to_string()));
        assert_eq!(parse("/unknown"), Input::UnknownCommand);
        assert_eq!(parse("안녕하세요"), Input::Text);
        assert_eq!(parse(""), Input::Text);
    }

    #[test]
    fn test_search_options() {
        let Input::Command(Command::Search(options)) =
            parse("/search keyword:홍길동 platform:에어비앤비 status:예약확정 startDate:2023-06-01 endDate:2023-06-30")
        else {
            panic!("expected a search command");
        };

        assert_eq!(
            options,
            SearchOptions {
                keyword: Some("홍길동".into()),
                platform: Some("에어비앤비".into()),
                status: Some("예약확정".into()),
                start_date: Some("2023-06-01".into()),
                end_date: Some("2023-06-30".into()),
            }
        );

        let filter = options.to_filter().unwrap();
        assert_eq!(
            filter.check_in,
            Some((NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), NaiveDate::from_ymd_opt(2023, 6, 30).unwrap()))
        );
    }

    #[test]
    fn test_search_bare_words_join_keyword() {
        let options = SearchOptions::parse("김 keyword:민지 010-1234 foo:bar status:");
        assert_eq!(options.keyword.as_deref(), Some("민지 김 010-1234 foo:bar"));
        assert_eq!(options.status, None);
    }

    #[test]
    fn test_search_dates() {
        let half = SearchOptions::parse("startDate:2024-06-01");
        assert_eq!(half.to_filter().unwrap().check_in, None);

        let bad = SearchOptions::parse("startDate:2024-13-01 endDate:2024-06-30");
        assert_eq!(bad.to_filter().unwrap_err().user_message(), INVALID_DATE);
    }

    #[test]
    fn test_period_ranges() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(StatsPeriod::Today.range(today), (today, today));
        assert_eq!(StatsPeriod::Week.range(today).0, NaiveDate::from_ymd_opt(2024, 6, 23).unwrap());
        assert_eq!(StatsPeriod::Month.range(today).0, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }
}
