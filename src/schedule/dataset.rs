//! The accumulated per-group lesson collection.

use std::collections::HashMap;

use super::model::{LessonRecord, WeekWindow};

/// Counts from one merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
  pub added: usize,
  pub updated: usize,
}

/// Deduplicated lessons for one group, keyed by lesson id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleDataset {
  lessons: HashMap<String, LessonRecord>,
}

impl ScheduleDataset {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build from persisted records. Later duplicates win.
  pub fn from_records(records: Vec<LessonRecord>) -> Self {
    let mut dataset = Self::new();
    dataset.merge(records);
    dataset
  }

  pub fn len(&self) -> usize {
    self.lessons.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lessons.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&LessonRecord> {
    self.lessons.get(id)
  }

  /// Upsert by id: new ids are inserted, known ids are overwritten.
  /// Records outside the fetched range are never touched.
  pub fn merge(&mut self, fetched: Vec<LessonRecord>) -> MergeStats {
    let mut stats = MergeStats::default();
    for lesson in fetched {
      match self.lessons.insert(lesson.id.clone(), lesson) {
        Some(_) => stats.updated += 1,
        None => stats.added += 1,
      }
    }
    stats
  }

  /// True iff at least one lesson is dated inside `window`.
  pub fn has_coverage(&self, window: &WeekWindow) -> bool {
    self.lessons.values().any(|l| window.contains(l.date))
  }

  /// Every lesson dated inside `window`, sorted by date and start time.
  pub fn filter(&self, window: &WeekWindow) -> Vec<LessonRecord> {
    let mut slice: Vec<LessonRecord> = self
      .lessons
      .values()
      .filter(|l| window.contains(l.date))
      .cloned()
      .collect();
    sort_lessons(&mut slice);
    slice
  }

  /// All lessons sorted by date and start time.
  pub fn to_sorted_vec(&self) -> Vec<LessonRecord> {
    let mut all: Vec<LessonRecord> = self.lessons.values().cloned().collect();
    sort_lessons(&mut all);
    all
  }

  pub fn clear(&mut self) {
    self.lessons.clear();
  }
}

/// Date, then start time, then id so the order is total.
pub fn sort_lessons(lessons: &mut [LessonRecord]) {
  lessons.sort_by(|a, b| {
    a.date
      .cmp(&b.date)
      .then_with(|| a.sort_key().cmp(&b.sort_key()))
      .then_with(|| a.id.cmp(&b.id))
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, NaiveDate};

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn lesson(id: &str, day: &str, room: &str) -> LessonRecord {
    LessonRecord {
      id: id.into(),
      date: date(day),
      starts_at: Some("09:00".into()),
      ends_at: Some("10:30".into()),
      pair_number: Some(1),
      title: "Physics".into(),
      teacher: "Petrov".into(),
      room: room.into(),
      lesson_type: "Seminar".into(),
      notes: None,
      group_id: "g1".into(),
    }
  }

  /// `count` lessons spread over the week starting at `monday`.
  fn week_of(prefix: &str, monday: &str, count: usize, room: &str) -> Vec<LessonRecord> {
    (0..count)
      .map(|i| {
        let day = date(monday) + Duration::days((i % 6) as i64);
        lesson(&format!("{}{}", prefix, i), &day.to_string(), room)
      })
      .collect()
  }

  fn window(start: &str, end: &str) -> WeekWindow {
    WeekWindow::new(date(start), date(end)).unwrap()
  }

  #[test]
  fn test_first_window_fills_empty_dataset() {
    let mut dataset = ScheduleDataset::new();
    let stats = dataset.merge(week_of("a", "2024-03-04", 5, "101"));

    assert_eq!(stats, MergeStats { added: 5, updated: 0 });
    assert_eq!(dataset.len(), 5);
    assert_eq!(dataset.filter(&window("2024-03-04", "2024-03-09")).len(), 5);
  }

  #[test]
  fn test_disjoint_window_extends_dataset() {
    let mut dataset = ScheduleDataset::new();
    let first = week_of("a", "2024-03-04", 5, "101");
    dataset.merge(first.clone());
    dataset.merge(week_of("b", "2024-03-11", 4, "101"));

    assert_eq!(dataset.len(), 9);
    let mut original = first;
    sort_lessons(&mut original);
    assert_eq!(dataset.filter(&window("2024-03-04", "2024-03-09")), original);
  }

  #[test]
  fn test_refetch_overwrites_overlapping_ids() {
    let mut dataset = ScheduleDataset::new();
    dataset.merge(week_of("a", "2024-03-04", 5, "101"));

    // Three ids shared with the first fetch, moved to another room.
    let mut refetch = week_of("a", "2024-03-04", 3, "305");
    refetch.extend(week_of("a", "2024-03-04", 5, "101").into_iter().skip(3));
    let stats = dataset.merge(refetch);

    assert_eq!(stats, MergeStats { added: 0, updated: 5 });
    let slice = dataset.filter(&window("2024-03-04", "2024-03-09"));
    assert_eq!(slice.len(), 5);
    for id in ["a0", "a1", "a2"] {
      assert_eq!(dataset.get(id).unwrap().room, "305");
    }
    for id in ["a3", "a4"] {
      assert_eq!(dataset.get(id).unwrap().room, "101");
    }
  }

  #[test]
  fn test_merge_is_idempotent() {
    let fetched = week_of("a", "2024-03-04", 6, "101");
    let mut once = ScheduleDataset::new();
    once.merge(fetched.clone());

    let mut twice = once.clone();
    twice.merge(fetched);

    assert_eq!(once, twice);
  }

  #[test]
  fn test_coverage_matches_filter() {
    let mut dataset = ScheduleDataset::new();
    dataset.merge(week_of("a", "2024-03-04", 5, "101"));

    let windows = [
      window("2024-03-04", "2024-03-09"),
      window("2024-03-08", "2024-03-08"),
      window("2024-03-09", "2024-03-15"),
      window("2024-03-11", "2024-03-16"),
      window("2024-02-26", "2024-03-03"),
    ];
    for w in windows {
      assert_eq!(dataset.has_coverage(&w), !dataset.filter(&w).is_empty(), "{}", w);
    }
    assert!(!ScheduleDataset::new().has_coverage(&windows[0]));
  }

  #[test]
  fn test_filter_returns_exactly_the_window() {
    let mut dataset = ScheduleDataset::new();
    dataset.merge(week_of("a", "2024-03-04", 6, "101"));
    dataset.merge(week_of("b", "2024-03-11", 6, "101"));

    let w = window("2024-03-06", "2024-03-12");
    let slice = dataset.filter(&w);
    assert!(slice.iter().all(|l| w.contains(l.date)));
    let inside = dataset.to_sorted_vec().into_iter().filter(|l| w.contains(l.date)).count();
    assert_eq!(slice.len(), inside);
  }

  #[test]
  fn test_sorted_by_date_then_time() {
    let mut late = lesson("x", "2024-03-04", "1");
    late.starts_at = Some("13:00".into());
    let early = lesson("y", "2024-03-04", "1");
    let next_day = lesson("z", "2024-03-05", "1");

    let dataset = ScheduleDataset::from_records(vec![next_day, late, early]);
    let ids: Vec<_> = dataset.to_sorted_vec().into_iter().map(|l| l.id).collect();
    assert_eq!(ids, vec!["y", "x", "z"]);
  }
}
