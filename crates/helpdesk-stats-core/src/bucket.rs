//! Date ranges and chart time buckets.
//!
//! Buckets always cover the whole requested range, whether or not any
//! entry falls into them. Week buckets start on Monday and are labelled
//! with the ISO week (`2024-W01`); days use `YYYY-MM-DD`, months `YYYY-MM`.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date, naming the offending field on failure.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, StatsError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| StatsError::validation(field, format!("expected YYYY-MM-DD, got '{}'", raw)))
}

/// An inclusive date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, StatsError> {
        if start > end {
            return Err(StatsError::validation(
                "start_date",
                format!("{} is after end_date {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// Parses a range where both bounds are mandatory.
    pub fn parse_required(start: Option<&str>, end: Option<&str>) -> Result<Self, StatsError> {
        match (start, end) {
            (Some(s), Some(e)) if !s.trim().is_empty() && !e.trim().is_empty() => {
                DateRange::new(parse_date("start_date", s)?, parse_date("end_date", e)?)
            }
            _ => Err(StatsError::validation(
                "start_date",
                "start_date and end_date are required",
            )),
        }
    }

    /// Number of days between the bounds (0 for a single-day range).
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Optional lower and upper bound, used where a range may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl OpenRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, StatsError> {
        let start = non_empty(start)
            .map(|s| parse_date("start_date", s))
            .transpose()?;
        let end = non_empty(end).map(|e| parse_date("end_date", e)).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            DateRange::new(s, e)?;
        }
        Ok(Self { start, end })
    }
}

impl From<DateRange> for OpenRange {
    fn from(range: DateRange) -> Self {
        Self {
            start: Some(range.start),
            end: Some(range.end),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Width of one chart bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested granularity, before `auto` is resolved against a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GranularityRequest {
    #[default]
    Auto,
    Fixed(Granularity),
}

impl FromStr for GranularityRequest {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "auto" => Ok(GranularityRequest::Auto),
            "day" => Ok(GranularityRequest::Fixed(Granularity::Day)),
            "week" => Ok(GranularityRequest::Fixed(Granularity::Week)),
            "month" => Ok(GranularityRequest::Fixed(Granularity::Month)),
            other => Err(StatsError::validation(
                "granularity",
                format!("expected day, week, month or auto, got '{}'", other),
            )),
        }
    }
}

/// Range-length limits used to resolve `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoThresholds {
    pub day_max_days: i64,
    pub week_max_days: i64,
}

impl Default for AutoThresholds {
    fn default() -> Self {
        Self {
            day_max_days: 90,
            week_max_days: 365,
        }
    }
}

impl GranularityRequest {
    pub fn resolve(self, range: &DateRange, thresholds: AutoThresholds) -> Granularity {
        match self {
            GranularityRequest::Fixed(g) => g,
            GranularityRequest::Auto => {
                let days = range.span_days();
                if days <= thresholds.day_max_days {
                    Granularity::Day
                } else if days <= thresholds.week_max_days {
                    Granularity::Week
                } else {
                    Granularity::Month
                }
            }
        }
    }
}

/// Label of the bucket containing `date`.
pub fn bucket_label(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format(DATE_FORMAT).to_string(),
        Granularity::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => date.format("%Y-%m").to_string(),
    }
}

fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            date - Days::new(u64::from(date.weekday().num_days_from_monday()))
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_bucket(date: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Day => date.succ_opt(),
        Granularity::Week => date.checked_add_days(Days::new(7)),
        Granularity::Month => date.checked_add_months(Months::new(1)),
    }
}

/// Every bucket label overlapping `range`, in chronological order.
pub fn bucket_labels(range: &DateRange, granularity: Granularity) -> Vec<String> {
    let mut labels = Vec::new();
    let mut cursor = Some(bucket_start(range.start, granularity));
    while let Some(date) = cursor {
        if date > range.end {
            break;
        }
        labels.push(bucket_label(date, granularity));
        cursor = next_bucket(date, granularity);
    }
    labels
}

/// Folds per-day counts into the zero-filled bucket series for `labels`.
///
/// Days whose bucket is not among `labels` are ignored.
pub fn fold_daily_counts(
    labels: &[String],
    daily: impl IntoIterator<Item = (NaiveDate, i64)>,
    granularity: Granularity,
) -> Vec<i64> {
    let index: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.as_str(), i))
        .collect();
    let mut data = vec![0; labels.len()];
    for (day, count) in daily {
        let label = bucket_label(day, granularity);
        if let Some(&i) = index.get(label.as_str()) {
            data[i] += count;
        }
    }
    data
}
