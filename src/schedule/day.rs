//! Per-day layout of a schedule slice with free-period placeholders.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

use super::dataset::sort_lessons;
use super::model::LessonRecord;

/// Widest pair range that still gets free-period placeholders.
const MAX_PAIR_SPAN: u32 = 16;

/// One row in a day's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayEntry {
  Lesson(LessonRecord),
  /// No lesson scheduled for this pair
  FreePeriod {
    id: String,
    date: NaiveDate,
    pair_number: u32,
  },
}

impl DayEntry {
  pub fn id(&self) -> &str {
    match self {
      DayEntry::Lesson(lesson) => &lesson.id,
      DayEntry::FreePeriod { id, .. } => id,
    }
  }

  pub fn is_free(&self) -> bool {
    matches!(self, DayEntry::FreePeriod { .. })
  }
}

/// All entries for one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySection {
  pub date: NaiveDate,
  pub entries: Vec<DayEntry>,
}

/// Group `lessons` by date and fill the gaps between numbered pairs.
///
/// Within a day, lessons without a pair number come first in start-time
/// order, followed by every pair from the lowest to the highest number
/// present. A pair with no lesson becomes a [`DayEntry::FreePeriod`].
/// Days whose pair numbers span more than 16 list their
/// lessons in pair order without placeholders.
pub fn layout_days(lessons: &[LessonRecord]) -> Vec<DaySection> {
  let mut by_date: BTreeMap<NaiveDate, Vec<LessonRecord>> = BTreeMap::new();
  for lesson in lessons {
    by_date.entry(lesson.date).or_default().push(lesson.clone());
  }

  by_date
    .into_iter()
    .map(|(date, mut day)| {
      sort_lessons(&mut day);
      DaySection {
        date,
        entries: layout_day(date, day),
      }
    })
    .collect()
}

fn layout_day(date: NaiveDate, day: Vec<LessonRecord>) -> Vec<DayEntry> {
  let (numbered, unnumbered): (Vec<_>, Vec<_>) =
    day.into_iter().partition(|l| l.pair_number.is_some());

  let mut entries: Vec<DayEntry> = unnumbered.into_iter().map(DayEntry::Lesson).collect();

  let mut by_pair: BTreeMap<u32, Vec<LessonRecord>> = BTreeMap::new();
  for lesson in numbered {
    if let Some(pair) = lesson.pair_number {
      by_pair.entry(pair).or_default().push(lesson);
    }
  }

  let (Some(&min), Some(&max)) = (by_pair.keys().next(), by_pair.keys().next_back()) else {
    return entries;
  };

  if max - min > MAX_PAIR_SPAN {
    warn!(date = %date, min, max, "Pair numbers too far apart, skipping free periods");
    entries.extend(by_pair.into_values().flatten().map(DayEntry::Lesson));
    return entries;
  }

  for pair in min..=max {
    match by_pair.remove(&pair) {
      Some(lessons) => entries.extend(lessons.into_iter().map(DayEntry::Lesson)),
      None => entries.push(DayEntry::FreePeriod {
        id: format!("gap-{}-{}", date, pair),
        date,
        pair_number: pair,
      }),
    }
  }
  entries
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lesson(id: &str, day: &str, pair: Option<u32>, starts_at: &str) -> LessonRecord {
    LessonRecord {
      id: id.into(),
      date: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
      starts_at: Some(starts_at.into()),
      ends_at: None,
      pair_number: pair,
      title: "History".into(),
      teacher: "Sidorov".into(),
      room: "12".into(),
      lesson_type: "Lecture".into(),
      notes: None,
      group_id: "g1".into(),
    }
  }

  fn ids(section: &DaySection) -> Vec<&str> {
    section.entries.iter().map(DayEntry::id).collect()
  }

  #[test]
  fn test_gaps_between_pairs_become_free_periods() {
    let lessons = vec![
      lesson("p4", "2024-03-04", Some(4), "13:40"),
      lesson("p1", "2024-03-04", Some(1), "08:30"),
    ];
    let days = layout_days(&lessons);

    assert_eq!(days.len(), 1);
    assert_eq!(
      ids(&days[0]),
      vec!["p1", "gap-2024-03-04-2", "gap-2024-03-04-3", "p4"]
    );
    assert!(days[0].entries[1].is_free());
  }

  #[test]
  fn test_absurd_pair_span_gets_no_placeholders() {
    let lessons = vec![
      lesson("late", "2024-03-04", Some(4_000_000_000), "20:00"),
      lesson("p1", "2024-03-04", Some(1), "08:30"),
      lesson("p3", "2024-03-04", Some(3), "11:50"),
    ];
    let days = layout_days(&lessons);

    assert_eq!(ids(&days[0]), vec!["p1", "p3", "late"]);
    assert!(days[0].entries.iter().all(|e| !e.is_free()));
  }

  #[test]
  fn test_unnumbered_lessons_come_first() {
    let lessons = vec![
      lesson("p2", "2024-03-05", Some(2), "10:10"),
      lesson("late", "2024-03-05", None, "18:00"),
      lesson("early", "2024-03-05", None, "07:00"),
    ];
    let days = layout_days(&lessons);
    assert_eq!(ids(&days[0]), vec!["early", "late", "p2"]);
  }

  #[test]
  fn test_days_are_ordered_and_separate() {
    let lessons = vec![
      lesson("b", "2024-03-06", Some(1), "08:30"),
      lesson("a", "2024-03-04", Some(2), "10:10"),
    ];
    let days = layout_days(&lessons);
    let dates: Vec<String> = days.iter().map(|d| d.date.to_string()).collect();

    assert_eq!(dates, vec!["2024-03-04", "2024-03-06"]);
    // No leading gaps below the first pair of the day
    assert_eq!(ids(&days[0]), vec!["a"]);
  }

  #[test]
  fn test_shared_pair_keeps_all_lessons() {
    let lessons = vec![
      lesson("sub2", "2024-03-04", Some(1), "08:30"),
      lesson("sub1", "2024-03-04", Some(1), "08:30"),
    ];
    let days = layout_days(&lessons);
    assert_eq!(ids(&days[0]), vec!["sub1", "sub2"]);
  }

  #[test]
  fn test_empty_slice_has_no_days() {
    assert!(layout_days(&[]).is_empty());
  }
}
