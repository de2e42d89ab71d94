//! Lesson records, week windows and the group selection.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::error::SyncError;

/// One scheduled class. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonRecord {
  pub id: String,
  pub date: NaiveDate,
  #[serde(default)]
  pub starts_at: Option<String>,
  #[serde(default)]
  pub ends_at: Option<String>,
  #[serde(default)]
  pub pair_number: Option<u32>,
  pub title: String,
  pub teacher: String,
  pub room: String,
  #[serde(rename = "type")]
  pub lesson_type: String,
  #[serde(default)]
  pub notes: Option<String>,
  pub group_id: String,
}

impl LessonRecord {
  /// Moment the lesson starts, used for ordering within a day.
  ///
  /// Accepts `HH:MM`, `H:MM` or a full ISO date-time in `starts_at`. A
  /// missing or unreadable start sorts at the beginning of the lesson's day.
  pub fn sort_key(&self) -> NaiveDateTime {
    self
      .starts_at
      .as_deref()
      .and_then(|value| parse_start(self.date, value))
      .unwrap_or_else(|| self.date.and_time(NaiveTime::default()))
  }

  /// Display label for the lesson time, e.g. `09:00 - 10:30`.
  pub fn time_label(&self) -> String {
    match (self.starts_at.as_deref(), self.ends_at.as_deref()) {
      (Some(start), Some(end)) => format!("{} - {}", start, end),
      (Some(start), None) => start.to_string(),
      (None, Some(end)) => end.to_string(),
      (None, None) => "time not specified".to_string(),
    }
  }
}

fn parse_start(date: NaiveDate, value: &str) -> Option<NaiveDateTime> {
  let value = value.trim();

  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.naive_local());
  }
  for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
      return Some(dt);
    }
  }

  clock_time(value).map(|time| date.and_time(time))
}

/// First `H:MM` / `HH:MM` occurrence in `value`.
fn clock_time(value: &str) -> Option<NaiveTime> {
  for (colon, _) in value.match_indices(':') {
    let hours: String = value[..colon]
      .chars()
      .rev()
      .take_while(|c| c.is_ascii_digit())
      .take(2)
      .collect::<Vec<_>>()
      .into_iter()
      .rev()
      .collect();
    let minutes: String = value[colon + 1..]
      .chars()
      .take_while(|c| c.is_ascii_digit())
      .take(2)
      .collect();

    if hours.is_empty() || minutes.len() != 2 {
      continue;
    }
    if let (Ok(h), Ok(m)) = (hours.parse::<u32>(), minutes.parse::<u32>()) {
      if let Some(time) = NaiveTime::from_hms_opt(h, m, 0) {
        return Some(time);
      }
    }
  }
  None
}

/// Number of days shown per week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
  /// Monday to Saturday
  SixDay,
  /// Monday to Sunday
  #[default]
  SevenDay,
}

impl DisplayMode {
  pub fn days(self) -> i64 {
    match self {
      DisplayMode::SixDay => 6,
      DisplayMode::SevenDay => 7,
    }
  }
}

/// Inclusive calendar date range bounding one fetch or display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekWindow {
  start: NaiveDate,
  end: NaiveDate,
}

impl WeekWindow {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SyncError> {
    if start > end {
      return Err(SyncError::InvalidWindow { start, end });
    }
    Ok(Self { start, end })
  }

  /// The Monday-aligned week that contains `date`.
  pub fn containing(date: NaiveDate, mode: DisplayMode) -> Self {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Self {
      start: monday,
      end: monday + Duration::days(mode.days() - 1),
    }
  }

  pub fn start(&self) -> NaiveDate {
    self.start
  }

  pub fn end(&self) -> NaiveDate {
    self.end
  }

  /// Same-length window moved by `weeks` whole weeks.
  pub fn shift_weeks(&self, weeks: i64) -> Self {
    let offset = Duration::days(7 * weeks);
    Self {
      start: self.start + offset,
      end: self.end + offset,
    }
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.end
  }

  pub fn overlaps(&self, other: &WeekWindow) -> bool {
    self.start <= other.end && other.start <= self.end
  }
}

impl fmt::Display for WeekWindow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.start, self.end)
  }
}

/// The (faculty, course, group) triple a schedule belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSelection {
  pub faculty: String,
  pub course: String,
  pub group: String,
}

/// Remote source of lessons for a date range.
pub trait LessonSource: Send + Sync {
  /// Lessons of `group` dated within `[from, to]`, in any order.
  fn fetch_lessons(
    &self,
    group: &GroupSelection,
    from: NaiveDate,
    to: NaiveDate,
  ) -> impl Future<Output = Result<Vec<LessonRecord>, SyncError>> + Send;
}
