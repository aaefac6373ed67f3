// src/models/profile.rs

//! Saved search profiles and their relative date windows.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::criteria::SearchCriteria;

const DEFAULT_RANGE_DAYS: u32 = 14;

/// Relative search window, resolved against "today" when a task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// Today through today + n days
    Days(u32),
    /// Today through the same day next month minus one day
    Month,
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange::Days(DEFAULT_RANGE_DAYS)
    }
}

impl DateRange {
    /// Parse the stored descriptor; anything unreadable falls back to 14 days.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("month") {
            return DateRange::Month;
        }
        match raw.parse::<u32>() {
            Ok(days) if days > 0 => DateRange::Days(days),
            _ => DateRange::default(),
        }
    }

    /// Resolve to concrete inclusive `(date_from, date_to)`.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = match self {
            DateRange::Days(days) => today
                .checked_add_days(Days::new(u64::from(*days)))
                .unwrap_or(NaiveDate::MAX),
            DateRange::Month => month_window_end(today),
        };
        (today, end)
    }
}

/// Same day next month minus one day.
///
/// When next month has no such day (Jan 31 -> Feb 31) the window ends on the
/// last day of next month instead.
fn month_window_end(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    match NaiveDate::from_ymd_opt(year, month, today.day()) {
        Some(same_day) => same_day.pred_opt().unwrap_or(same_day),
        None => last_day_of_month(year, month),
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::Days(days) => write!(f, "{days}"),
            DateRange::Month => f.write_str("month"),
        }
    }
}

impl Serialize for DateRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(days) => match u32::try_from(days) {
                Ok(days) if days > 0 => DateRange::Days(days),
                _ => DateRange::default(),
            },
            Raw::Text(text) => DateRange::parse(&text),
        })
    }
}

/// A named, reusable search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,

    #[serde(flatten)]
    pub criteria: SearchCriteria,

    #[serde(default)]
    pub date_range_days: DateRange,

    /// Run this profile on every periodic trigger
    #[serde(default)]
    pub scheduled_check: bool,
}

impl Profile {
    /// Criteria for a task started today; stored dates are always replaced.
    pub fn resolve(&self, today: NaiveDate) -> SearchCriteria {
        let (from, to) = self.date_range_days.resolve(today);
        SearchCriteria {
            date_from: Some(from),
            date_to: Some(to),
            ..self.criteria.clone()
        }
    }
}
