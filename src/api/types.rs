//! Domain types returned by the API client besides lessons.

use serde::{Deserialize, Serialize};

/// Homework attached to one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkTask {
  pub id: Option<String>,
  pub lesson_id: String,
  pub group_id: String,
  pub homework_text: String,
  pub updated_at: Option<String>,
}

fn enabled() -> bool {
  true
}

fn default_language() -> String {
  "ru".to_string()
}

/// Per-user notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
  #[serde(default = "enabled")]
  pub notifications_enabled: bool,
  #[serde(default = "enabled")]
  pub homework_notifications: bool,
  #[serde(default = "enabled")]
  pub schedule_notifications: bool,
  #[serde(default = "enabled")]
  pub group_notifications: bool,
  #[serde(default = "enabled")]
  pub system_notifications: bool,
  #[serde(default = "enabled")]
  pub reminder_notifications: bool,
  #[serde(default)]
  pub quiet_hours_start: Option<String>,
  #[serde(default)]
  pub quiet_hours_end: Option<String>,
  #[serde(default = "default_language")]
  pub language: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_settings_fill_missing_fields() {
    let settings: NotificationSettings =
      serde_json::from_str(r#"{ "homework_notifications": false, "quiet_hours_start": "23:00" }"#)
        .unwrap();
    assert!(settings.notifications_enabled);
    assert!(!settings.homework_notifications);
    assert_eq!(settings.quiet_hours_start.as_deref(), Some("23:00"));
    assert_eq!(settings.language, "ru");
  }
}
