// src/models/criteria.rs

//! Search criteria submitted with every task.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Weekday labels used by the criteria form, indexed 0 (Sunday) through 6.
pub const WEEKDAY_LABELS: [&str; 7] = [
    "日曜日", "月曜日", "火曜日", "水曜日", "木曜日", "金曜日", "土曜日",
];

/// Single-character weekday marks used in calendar column headers.
pub const WEEKDAY_MARKS: [char; 7] = ['日', '月', '火', '水', '木', '金', '土'];

/// Label of the public holiday filter control.
pub const HOLIDAY_LABEL: &str = "祝日";

/// A selectable value scraped from the site: the form code and its display label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Immutable input to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    /// Usage purposes (sport/activity); at least one is required
    #[serde(default)]
    pub purposes: Vec<Choice>,

    /// Wards/areas to narrow facilities to
    #[serde(default)]
    pub areas: Vec<Choice>,

    /// First day of the search window (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,

    /// Last day of the search window (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,

    /// Earliest slot start as an `HHMM` option value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_from: Option<String>,

    /// Latest slot end as an `HHMM` option value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to: Option<String>,

    /// Weekdays 0 (Sunday) through 6; empty means every day
    #[serde(default)]
    pub days_of_week: BTreeSet<u8>,

    /// Whether public holidays are included, independent of the weekday set
    #[serde(default)]
    pub include_holiday: bool,
}

impl SearchCriteria {
    /// Reject criteria that cannot produce a runnable task.
    pub fn validate(&self) -> Result<()> {
        if self.purposes.is_empty() {
            return Err(AppError::validation("at least one purpose is required"));
        }
        if let Some(day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(AppError::validation(format!(
                "day of week {day} is out of range 0-6"
            )));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppError::validation(format!(
                    "dateFrom {from} is after dateTo {to}"
                )));
            }
        }
        for time in [&self.time_from, &self.time_to].into_iter().flatten() {
            if !is_hhmm(time) {
                return Err(AppError::validation(format!(
                    "time '{time}' is not an HHMM value"
                )));
            }
        }
        Ok(())
    }

    /// Whether a weekday filter applies at all.
    ///
    /// An empty set and the full set both mean "every day".
    pub fn filters_weekdays(&self) -> bool {
        !self.days_of_week.is_empty() && self.days_of_week.len() < 7
    }

    /// Whether the task touches the criteria form's day controls.
    pub fn has_day_filter(&self) -> bool {
        !self.days_of_week.is_empty() || self.include_holiday
    }

    pub fn wants_day(&self, day: u8) -> bool {
        self.days_of_week.contains(&day)
    }
}

/// Map a weekday label or calendar mark back to 0 (Sunday) through 6.
pub fn weekday_from_mark(mark: char) -> Option<u8> {
    WEEKDAY_MARKS
        .iter()
        .position(|m| *m == mark)
        .map(|i| i as u8)
}

fn is_hhmm(value: &str) -> bool {
    if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let hours: u32 = value[..2].parse().unwrap_or(99);
    let minutes: u32 = value[2..].parse().unwrap_or(99);
    hours <= 24 && minutes < 60
}

/// Format an `HHMM` value for display.
pub fn format_hhmm(value: Option<&str>) -> String {
    match value {
        Some(v) if v.len() == 4 => format!("{}:{}", &v[..2], &v[2..]),
        _ => "?".to_string(),
    }
}
