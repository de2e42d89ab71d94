//! When the engine refreshes on its own.

use std::time::Duration;

/// Default number of weeks preloaded after the displayed one.
pub const DEFAULT_WEEKS_AHEAD: u32 = 3;
/// Default number of weeks preloaded before the displayed one.
pub const DEFAULT_WEEKS_BEHIND: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
  /// Reload the displayed window when the app resumes
  pub resume_refresh: bool,
  /// Skip the resume reload if the last sync is more recent than this
  pub min_resume_interval: Duration,
  pub preload_weeks_ahead: u32,
  pub preload_weeks_behind: u32,
}

impl Default for RefreshPolicy {
  fn default() -> Self {
    Self {
      resume_refresh: true,
      min_resume_interval: Duration::ZERO,
      preload_weeks_ahead: DEFAULT_WEEKS_AHEAD,
      preload_weeks_behind: DEFAULT_WEEKS_BEHIND,
    }
  }
}

impl RefreshPolicy {
  pub fn with_min_resume_interval(mut self, interval: Duration) -> Self {
    self.min_resume_interval = interval;
    self
  }

  pub fn with_preload(mut self, weeks_ahead: u32, weeks_behind: u32) -> Self {
    self.preload_weeks_ahead = weeks_ahead;
    self.preload_weeks_behind = weeks_behind;
    self
  }

  /// Whether a resume should reload, given the time since the last sync.
  pub fn should_refresh_on_resume(&self, since_last_sync: Option<Duration>) -> bool {
    if !self.resume_refresh {
      return false;
    }
    match since_last_sync {
      Some(elapsed) => elapsed >= self.min_resume_interval,
      None => true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_always_refreshes() {
    let policy = RefreshPolicy::default();
    assert!(policy.should_refresh_on_resume(None));
    assert!(policy.should_refresh_on_resume(Some(Duration::ZERO)));
  }

  #[test]
  fn test_min_interval_suppresses_recent_sync() {
    let policy = RefreshPolicy::default().with_min_resume_interval(Duration::from_secs(60));
    assert!(!policy.should_refresh_on_resume(Some(Duration::from_secs(10))));
    assert!(policy.should_refresh_on_resume(Some(Duration::from_secs(61))));
  }

  #[test]
  fn test_disabled() {
    let policy = RefreshPolicy {
      resume_refresh: false,
      ..RefreshPolicy::default()
    };
    assert!(!policy.should_refresh_on_resume(None));
  }
}
