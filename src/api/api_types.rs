//! Serde-deserializable types matching the schedule server's responses.
//!
//! These stay separate from the domain types so the lenient wire format
//! (numeric or string ids, missing fields, two date formats) is handled in
//! one place.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use super::types::HomeworkTask;
use crate::schedule::LessonRecord;

/// Ids arrive as numbers from some endpoints and as strings from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
  Text(String),
  Number(i64),
}

impl From<RawId> for String {
  fn from(id: RawId) -> Self {
    match id {
      RawId::Text(s) => s,
      RawId::Number(n) => n.to_string(),
    }
  }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  RawId::deserialize(deserializer).map(String::from)
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

/// Parse `YYYY-MM-DD`, `DD.MM.YYYY` or an ISO date-time down to its date.
pub fn normalize_date(value: &str) -> Option<NaiveDate> {
  let value = value.trim();
  if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
    return Some(date);
  }
  if let Ok(date) = NaiveDate::parse_from_str(value, "%d.%m.%Y") {
    return Some(date);
  }
  value
    .get(..10)
    .filter(|_| value.as_bytes().get(10).map_or(false, |b| *b == b'T' || *b == b' '))
    .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

// ============================================================================
// Schedule
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiGroup {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLesson {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub date: String,
  #[serde(default)]
  pub pair_number: Option<u32>,
  #[serde(default)]
  pub starts_at: Option<String>,
  #[serde(default)]
  pub ends_at: Option<String>,
  #[serde(default)]
  pub subject: Option<String>,
  #[serde(default, rename = "type")]
  pub lesson_type: Option<String>,
  #[serde(default)]
  pub teacher: Option<String>,
  #[serde(default)]
  pub room: Option<String>,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub group_id: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
}

/// Missing or blank text falls back to `default`.
fn or_default(value: Option<String>, default: &str) -> String {
  value
    .filter(|v| !v.trim().is_empty())
    .unwrap_or_else(|| default.to_string())
}

impl ApiLesson {
  /// Convert to a domain record. Lessons whose date cannot be read are
  /// dropped.
  pub fn into_record(self, fallback_group: &str) -> Option<LessonRecord> {
    let Some(date) = normalize_date(&self.date) else {
      warn!(lesson = %self.id, date = %self.date, "Dropping lesson with unreadable date");
      return None;
    };

    Some(LessonRecord {
      id: self.id,
      date,
      starts_at: self.starts_at,
      ends_at: self.ends_at,
      pair_number: self.pair_number,
      title: or_default(self.subject, "Untitled"),
      teacher: or_default(self.teacher, "Teacher not specified"),
      room: or_default(self.room, "Room not specified"),
      lesson_type: or_default(self.lesson_type, "Class"),
      notes: self.notes,
      group_id: self.group_id.unwrap_or_else(|| fallback_group.to_string()),
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiScheduleResponse {
  #[serde(default)]
  pub group: Option<ApiGroup>,
  #[serde(default)]
  pub lessons: Vec<ApiLesson>,
}

impl ApiScheduleResponse {
  /// Domain records; `requested_group` backs up a missing group id.
  pub fn into_records(self, requested_group: &str) -> Vec<LessonRecord> {
    let fallback = self
      .group
      .map(|g| g.id)
      .unwrap_or_else(|| requested_group.to_string());
    self
      .lessons
      .into_iter()
      .filter_map(|lesson| lesson.into_record(&fallback))
      .collect()
  }
}

// ============================================================================
// Homework
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiHomework {
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub id: Option<String>,
  #[serde(deserialize_with = "deserialize_id")]
  pub lesson_id: String,
  #[serde(default, deserialize_with = "deserialize_opt_id")]
  pub group_id: Option<String>,
  #[serde(default)]
  pub homework_text: String,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl ApiHomework {
  pub fn into_task(self, fallback_group: &str) -> HomeworkTask {
    HomeworkTask {
      id: self.id,
      lesson_id: self.lesson_id,
      group_id: self.group_id.unwrap_or_else(|| fallback_group.to_string()),
      homework_text: self.homework_text,
      updated_at: self.updated_at,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiHomeworkResponse {
  #[serde(default)]
  pub homework: Vec<ApiHomework>,
}

fn succeeded() -> bool {
  true
}

/// Body of a homework write answer.
#[derive(Debug, Deserialize)]
pub struct ApiWriteResponse {
  #[serde(default = "succeeded")]
  pub success: bool,
  #[serde(default)]
  pub message: String,
}
