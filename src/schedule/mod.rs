//! Schedule data model and the offline-first synchronization engine.

mod dataset;
pub mod day;
mod engine;
mod model;
mod policy;

pub use dataset::{MergeStats, ScheduleDataset};
pub use day::{layout_days, DayEntry, DaySection};
pub use engine::{
  LoadOptions, LoadOutcome, Navigation, PreloadReport, ScheduleEngine, ScheduleUpdate, SyncPhase,
  SyncState, DATASET_TTL,
};
pub use model::{DisplayMode, GroupSelection, LessonRecord, LessonSource, WeekWindow};
pub use policy::{RefreshPolicy, DEFAULT_WEEKS_AHEAD, DEFAULT_WEEKS_BEHIND};
