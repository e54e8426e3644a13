//! Date normalization as an ordered list of pure parsing strategies.
//!
//! Strategies are tried in order and the first success wins. The list is owned by
//! the [`DateParser`] value, so callers can swap or reorder strategies without any
//! global state.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

/// Explicit formats, day-first before month-first.
pub const STANDARD_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%d/%m/%y",
    "%m/%d/%y",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateStrategy {
    /// `chrono` format string that must consume the whole input. A `%Y` year must
    /// have four digits, so short years fall through to the `%y` entries.
    Format(&'static str),
    /// Token scan that ignores surrounding words, reading numeric dates day-first.
    Permissive,
}

impl DateStrategy {
    pub fn apply(&self, input: &str) -> Option<NaiveDate> {
        match self {
            Self::Format(format) => NaiveDate::parse_from_str(input, format)
                .ok()
                .filter(|date| !format.contains("%Y") || date.year() >= 1000),
            Self::Permissive => permissive_parse(input),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DateParser {
    strategies: Vec<DateStrategy>,
}

impl Default for DateParser {
    fn default() -> Self {
        Self::standard()
    }
}

impl DateParser {
    pub fn standard() -> Self {
        let mut strategies =
            STANDARD_FORMATS.iter().map(|format| DateStrategy::Format(format)).collect::<Vec<_>>();
        strategies.push(DateStrategy::Permissive);
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<DateStrategy>) -> Self {
        Self { strategies }
    }

    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let cleaned = strip_ordinals(raw.trim());
        if cleaned.is_empty() {
            return None;
        }
        self.strategies.iter().find_map(|strategy| strategy.apply(&cleaned))
    }
}

fn ordinal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"))
}

fn strip_ordinals(value: &str) -> String {
    ordinal_pattern().replace_all(value, "$1").into_owned()
}

fn month_from_name(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    MONTHS
        .iter()
        .position(|month| month.starts_with(&lower) || (lower == "sept" && *month == "september"))
        .map(|index| index as u32 + 1)
}

fn permissive_parse(input: &str) -> Option<NaiveDate> {
    let tokens = input
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();

    let mut month_name = None;
    let mut year = None;
    let mut year_index = None;
    let mut small_numbers = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        if token.chars().all(|character| character.is_ascii_digit()) {
            match token.len() {
                4 if year.is_none() => {
                    year = token.parse::<i32>().ok();
                    year_index = Some(index);
                }
                1 | 2 => {
                    if let Ok(value) = token.parse::<u32>() {
                        small_numbers.push((index, value));
                    }
                }
                _ => {}
            }
        } else if month_name.is_none() {
            month_name = month_from_name(token);
        }
    }

    if let Some(month) = month_name {
        let (day_position, day) = small_numbers.first().copied()?;
        let year = match year {
            Some(year) => year,
            None => {
                let (_, short_year) =
                    small_numbers.iter().copied().find(|(index, _)| *index > day_position)?;
                2000 + short_year as i32
            }
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let (Some(year), Some(year_index)) = (year, year_index) else {
        let [(_, first), (_, second), (_, short_year)] = small_numbers.get(..3)? else {
            return None;
        };
        return day_first(2000 + *short_year as i32, *first, *second);
    };
    let [(first_index, first), (_, second)] = small_numbers.get(..2)? else {
        return None;
    };

    if year_index < *first_index {
        return NaiveDate::from_ymd_opt(year, *first, *second);
    }

    day_first(year, *first, *second)
}

/// Reads `first/second` as day/month, swapping only when that is the sole valid reading.
fn day_first(year: i32, first: u32, second: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, second, first).or_else(|| {
        if first <= 12 {
            NaiveDate::from_ymd_opt(year, first, second)
        } else {
            None
        }
    })
}

/// Canonical ISO rendering used for labels and distinct values.
pub fn iso(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}
