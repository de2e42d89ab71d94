//! Schedule synchronization engine.
//!
//! Keeps one accumulated dataset per selected group, serves the displayed
//! week from it, fetches windows on demand and merges the results by lesson
//! id. Adjacent weeks are preloaded in the background through the same
//! fetch/merge path.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dataset::{MergeStats, ScheduleDataset};
use super::model::{GroupSelection, LessonRecord, LessonSource, WeekWindow};
use super::policy::RefreshPolicy;
use crate::cache::{CacheKey, CacheStore};
use crate::error::SyncError;
use crate::network::NetworkMonitor;

/// Default lifetime of the persisted per-group dataset.
pub const DATASET_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Where the engine is in its load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
  #[default]
  Idle,
  /// Restoring the persisted dataset
  Hydrating,
  /// Showing data already held locally
  ServingCached,
  Fetching,
  Merging,
  /// Showing data that includes the latest fetch
  ServingMerged,
}

/// UI-visible engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
  pub group: Option<GroupSelection>,
  pub displayed_window: Option<WeekWindow>,
  pub current_schedule: Vec<LessonRecord>,
  pub is_loading: bool,
  pub is_offline: bool,
  pub last_synced_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
  pub phase: SyncPhase,
  pub is_preloading: bool,
}

/// Published to subscribers after every visible state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleUpdate {
  pub current_schedule: Vec<LessonRecord>,
  pub is_loading: bool,
  pub is_offline: bool,
  pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
  /// Drive the loading flag and publish the window's slice
  pub show_loading: bool,
  /// Fetch even when the window is already covered
  pub force_refresh: bool,
}

impl LoadOptions {
  /// A load the user is waiting on.
  pub fn foreground() -> Self {
    Self {
      show_loading: true,
      force_refresh: false,
    }
  }

  /// A silent load that never touches the loading flag.
  pub fn background() -> Self {
    Self::default()
  }

  pub fn forced(mut self) -> Self {
    self.force_refresh = true;
    self
  }
}

/// Result of one `load_window` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
  pub window: WeekWindow,
  /// Dataset slice for the window once the load finished
  pub lessons: Vec<LessonRecord>,
  /// Set when a fetch ran and was merged
  pub merged: Option<MergeStats>,
  /// Fetch failure when locally held data was served instead
  pub fetch_error: Option<SyncError>,
  /// The group changed while the fetch was in flight; nothing was merged
  pub discarded: bool,
}

impl LoadOutcome {
  fn served(window: WeekWindow, lessons: Vec<LessonRecord>) -> Self {
    Self {
      window,
      lessons,
      merged: None,
      fetch_error: None,
      discarded: false,
    }
  }

  fn discarded(window: WeekWindow) -> Self {
    Self {
      discarded: true,
      ..Self::served(window, Vec::new())
    }
  }

  pub fn fetched(&self) -> bool {
    self.merged.is_some()
  }
}

/// Counts from one preload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreloadReport {
  pub attempted: usize,
  pub succeeded: usize,
  /// Another preload was running or the network is down
  pub skipped: bool,
}

/// Result of a navigation: the foreground load plus the spawned preload.
pub struct Navigation {
  pub outcome: Result<LoadOutcome, SyncError>,
  pub preload: JoinHandle<PreloadReport>,
}

/// Dataset tagged with the group selection it belongs to.
#[derive(Default)]
struct GroupData {
  generation: u64,
  dataset: ScheduleDataset,
}

impl GroupData {
  /// Align with `generation`. Returns false when a newer selection already
  /// owns the dataset.
  fn sync_to(&mut self, generation: u64) -> bool {
    if self.generation < generation {
      self.dataset.clear();
      self.generation = generation;
    }
    self.generation == generation
  }
}

struct EngineState {
  sync: SyncState,
  /// Bumped on every group change
  generation: u64,
}

/// Clears the preload flag when dropped.
struct PreloadGuard<'a>(&'a AtomicBool);

impl Drop for PreloadGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct ScheduleEngine<S> {
  source: Arc<S>,
  store: Arc<CacheStore>,
  network: Arc<NetworkMonitor>,
  policy: RefreshPolicy,
  dataset_ttl: Duration,
  data: tokio::sync::Mutex<GroupData>,
  state: Mutex<EngineState>,
  has_synced: AtomicBool,
  preloading: AtomicBool,
  subscribers: Mutex<Vec<mpsc::UnboundedSender<ScheduleUpdate>>>,
}

impl<S: LessonSource + 'static> ScheduleEngine<S> {
  pub fn new(source: Arc<S>, store: Arc<CacheStore>, network: Arc<NetworkMonitor>) -> Self {
    let sync = SyncState {
      is_offline: !network.is_connected(),
      ..SyncState::default()
    };
    Self {
      source,
      store,
      network,
      policy: RefreshPolicy::default(),
      dataset_ttl: DATASET_TTL,
      data: tokio::sync::Mutex::new(GroupData::default()),
      state: Mutex::new(EngineState {
        sync,
        generation: 0,
      }),
      has_synced: AtomicBool::new(false),
      preloading: AtomicBool::new(false),
      subscribers: Mutex::new(Vec::new()),
    }
  }

  pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Set how long the persisted dataset stays valid.
  pub fn with_dataset_ttl(mut self, ttl: Duration) -> Self {
    self.dataset_ttl = ttl;
    self
  }

  pub fn policy(&self) -> &RefreshPolicy {
    &self.policy
  }

  /// Bind the engine to `selection`. A different group drops the in-memory
  /// dataset and the visible slice; in-flight fetches for the old group are
  /// discarded when they complete.
  pub async fn select_group(&self, selection: GroupSelection) {
    let generation = {
      let mut state = self.lock_state();
      if state.sync.group.as_ref() == Some(&selection) {
        return;
      }
      info!(group = %selection.group, "Selected group");
      state.generation += 1;
      state.sync.group = Some(selection);
      state.sync.current_schedule.clear();
      state.sync.is_loading = false;
      state.sync.last_synced_at = None;
      state.sync.last_error = None;
      state.sync.phase = SyncPhase::Idle;
      self.has_synced.store(false, Ordering::Release);
      state.generation
    };

    self.data.lock().await.sync_to(generation);
    self.publish();
  }

  /// Make sure `window` is available locally, fetching it when needed.
  ///
  /// A fetch happens when forced, when nothing has been fetched yet for the
  /// group, or when the dataset has no lesson inside the window. Fetched
  /// lessons are merged by id and the dataset is persisted.
  pub async fn load_window(
    &self,
    window: WeekWindow,
    options: LoadOptions,
  ) -> Result<LoadOutcome, SyncError> {
    let (group, generation) = self.binding()?;
    let key = CacheKey::schedule(&group.group);

    let (covered, slice) = {
      let mut data = self.data.lock().await;
      if !data.sync_to(generation) {
        return Ok(LoadOutcome::discarded(window));
      }
      if data.dataset.is_empty() {
        self.hydrate(&key, &mut data.dataset);
      }
      (data.dataset.has_coverage(&window), data.dataset.filter(&window))
    };

    let needs_fetch =
      options.force_refresh || !self.has_synced.load(Ordering::Acquire) || !covered;

    if options.show_loading && covered {
      let mut state = self.lock_state();
      state.sync.current_schedule = slice.clone();
      state.sync.last_error = None;
      state.sync.phase = SyncPhase::ServingCached;
      drop(state);
      self.publish();
    }

    if !needs_fetch {
      debug!(window = %window, lessons = slice.len(), "Window already covered");
      return Ok(LoadOutcome::served(window, slice));
    }

    {
      let mut state = self.lock_state();
      if options.show_loading {
        state.sync.is_loading = true;
      }
      state.sync.phase = SyncPhase::Fetching;
    }
    if options.show_loading {
      self.publish();
    }

    debug!(window = %window, forced = options.force_refresh, "Fetching schedule window");
    let fetched = self
      .source
      .fetch_lessons(&group, window.start(), window.end())
      .await;

    match fetched {
      Ok(records) => self.merge_fetched(window, options, generation, &key, records).await,
      Err(e) => self.fetch_failed(window, options, generation, e).await,
    }
  }

  /// Load the `weeks_ahead` following and `weeks_behind` preceding windows
  /// in the background. Failures are logged and ignored.
  pub async fn preload_adjacent_windows(
    &self,
    current: WeekWindow,
    weeks_ahead: u32,
    weeks_behind: u32,
  ) -> PreloadReport {
    if !self.network.is_connected() {
      debug!("Offline, skipping preload");
      return PreloadReport {
        skipped: true,
        ..PreloadReport::default()
      };
    }
    if self
      .preloading
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("Preload already in progress, skipping");
      return PreloadReport {
        skipped: true,
        ..PreloadReport::default()
      };
    }
    let _guard = PreloadGuard(&self.preloading);

    let windows: Vec<WeekWindow> = (1..=i64::from(weeks_ahead))
      .map(|n| current.shift_weeks(n))
      .chain((1..=i64::from(weeks_behind)).map(|n| current.shift_weeks(-n)))
      .collect();

    let results = join_all(
      windows
        .iter()
        .map(|window| self.load_window(*window, LoadOptions::background())),
    )
    .await;

    let mut report = PreloadReport {
      attempted: windows.len(),
      ..PreloadReport::default()
    };
    for (window, result) in windows.iter().zip(results) {
      match result {
        Ok(_) => report.succeeded += 1,
        Err(e) => debug!(window = %window, error = %e, "Preload failed"),
      }
    }
    debug!(
      attempted = report.attempted,
      succeeded = report.succeeded,
      "Preload finished"
    );
    report
  }

  /// Show `window`, recomputing the visible slice from the dataset without
  /// fetching.
  pub async fn set_window(&self, window: WeekWindow) {
    let generation = self.lock_state().generation;
    let slice = {
      let mut data = self.data.lock().await;
      if data.sync_to(generation) {
        data.dataset.filter(&window)
      } else {
        Vec::new()
      }
    };

    let mut state = self.lock_state();
    state.sync.displayed_window = Some(window);
    if slice.is_empty() {
      state.sync.last_error = None;
    }
    state.sync.current_schedule = slice;
    drop(state);
    self.publish();
  }

  /// App came back to the foreground. Reloads the displayed window silently
  /// when the policy allows; returns `None` when nothing was loaded.
  pub async fn on_resume(&self) -> Option<Result<LoadOutcome, SyncError>> {
    let (window, last_synced) = {
      let state = self.lock_state();
      state.sync.group.as_ref()?;
      (state.sync.displayed_window?, state.sync.last_synced_at)
    };

    let since = last_synced.map(|at| (self.store.now() - at).to_std().unwrap_or_default());
    if !self.policy.should_refresh_on_resume(since) {
      debug!(since = ?since, "Skipping resume refresh");
      return None;
    }
    Some(self.load_window(window, LoadOptions::background()).await)
  }

  /// Pull-to-refresh: force a silent reload of the displayed window, then
  /// preload its neighbours.
  pub async fn refresh(&self) -> Result<LoadOutcome, SyncError> {
    let window = {
      let state = self.lock_state();
      if state.sync.group.is_none() {
        return Err(SyncError::NoGroupSelected);
      }
      state
        .sync
        .displayed_window
        .ok_or_else(|| SyncError::no_data("no window displayed"))?
    };

    let outcome = self
      .load_window(window, LoadOptions::background().forced())
      .await;
    self
      .preload_adjacent_windows(
        window,
        self.policy.preload_weeks_ahead,
        self.policy.preload_weeks_behind,
      )
      .await;
    outcome
  }

  /// Switch to `window`: show what is held locally, load it in the
  /// foreground and start preloading its neighbours.
  pub async fn navigate(self: &Arc<Self>, window: WeekWindow) -> Navigation {
    self.set_window(window).await;
    let outcome = self.load_window(window, LoadOptions::foreground()).await;

    let engine = Arc::clone(self);
    let (ahead, behind) = (
      self.policy.preload_weeks_ahead,
      self.policy.preload_weeks_behind,
    );
    let preload =
      tokio::spawn(async move { engine.preload_adjacent_windows(window, ahead, behind).await });

    Navigation { outcome, preload }
  }

  /// Follow the network monitor: every online/offline transition updates
  /// the offline indicator and is published. The task ends once the engine
  /// or the monitor is dropped.
  pub fn watch_network(self: &Arc<Self>) -> JoinHandle<()> {
    let mut rx = self.network.subscribe();
    let engine: Weak<Self> = Arc::downgrade(self);
    tokio::spawn(async move {
      loop {
        let online = *rx.borrow_and_update();
        match engine.upgrade() {
          Some(engine) => engine.set_offline(!online),
          None => break,
        }
        if rx.changed().await.is_err() {
          break;
        }
      }
    })
  }

  pub fn snapshot(&self) -> SyncState {
    let mut sync = self.lock_state().sync.clone();
    sync.is_preloading = self.preloading.load(Ordering::Acquire);
    sync
  }

  /// Receive a [`ScheduleUpdate`] after every visible state change.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ScheduleUpdate> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock_subscribers().push(tx);
    rx
  }

  fn binding(&self) -> Result<(GroupSelection, u64), SyncError> {
    let state = self.lock_state();
    let group = state.sync.group.clone().ok_or(SyncError::NoGroupSelected)?;
    Ok((group, state.generation))
  }

  fn hydrate(&self, key: &CacheKey, dataset: &mut ScheduleDataset) {
    self.lock_state().sync.phase = SyncPhase::Hydrating;
    if let Some(records) = self.store.get::<Vec<LessonRecord>>(key) {
      *dataset = ScheduleDataset::from_records(records);
      info!(cache = %key, lessons = dataset.len(), "Restored schedule from cache");
    }
  }

  async fn merge_fetched(
    &self,
    window: WeekWindow,
    options: LoadOptions,
    generation: u64,
    key: &CacheKey,
    records: Vec<LessonRecord>,
  ) -> Result<LoadOutcome, SyncError> {
    let mut data = self.data.lock().await;
    if !data.sync_to(generation) {
      debug!(window = %window, "Group changed during fetch, discarding result");
      return Ok(LoadOutcome::discarded(window));
    }

    self.lock_state().sync.phase = SyncPhase::Merging;
    let stats = data.dataset.merge(records);
    self
      .store
      .put(key, &data.dataset.to_sorted_vec(), self.dataset_ttl);
    self.has_synced.store(true, Ordering::Release);
    let lessons = data.dataset.filter(&window);

    let mut state = self.lock_state();
    let displayed = state.sync.displayed_window;
    let visible = options.show_loading || displayed.map_or(false, |d| d.overlaps(&window));
    if visible {
      state.sync.current_schedule = data.dataset.filter(&displayed.unwrap_or(window));
      state.sync.last_error = None;
    }
    drop(data);

    state.sync.is_offline = false;
    state.sync.last_synced_at = Some(self.store.now());
    if options.show_loading {
      state.sync.is_loading = false;
    }
    state.sync.phase = SyncPhase::ServingMerged;
    drop(state);
    self.publish();

    info!(
      window = %window,
      added = stats.added,
      updated = stats.updated,
      "Schedule window synced"
    );
    Ok(LoadOutcome {
      merged: Some(stats),
      ..LoadOutcome::served(window, lessons)
    })
  }

  async fn fetch_failed(
    &self,
    window: WeekWindow,
    options: LoadOptions,
    generation: u64,
    error: SyncError,
  ) -> Result<LoadOutcome, SyncError> {
    warn!(window = %window, error = %error, "Failed to fetch schedule window");

    let lessons = {
      let mut data = self.data.lock().await;
      if !data.sync_to(generation) {
        return Err(error);
      }
      data.dataset.filter(&window)
    };

    let mut state = self.lock_state();
    if !self.network.is_connected() {
      state.sync.is_offline = true;
    }
    let displayed = state.sync.displayed_window == Some(window);
    if lessons.is_empty() && (options.show_loading || displayed) {
      state.sync.last_error = Some(error.to_string());
    }
    if options.show_loading {
      state.sync.is_loading = false;
    }
    state.sync.phase = if lessons.is_empty() {
      SyncPhase::Idle
    } else {
      SyncPhase::ServingCached
    };
    drop(state);
    self.publish();

    if lessons.is_empty() {
      return Err(SyncError::no_data(format!("schedule for {}: {}", window, error)));
    }
    Ok(LoadOutcome {
      fetch_error: Some(error),
      ..LoadOutcome::served(window, lessons)
    })
  }

  fn set_offline(&self, offline: bool) {
    {
      let mut state = self.lock_state();
      if state.sync.is_offline == offline {
        return;
      }
      state.sync.is_offline = offline;
    }
    info!(offline, "Offline indicator changed");
    self.publish();
  }

  fn publish(&self) {
    let update = {
      let state = self.lock_state();
      ScheduleUpdate {
        current_schedule: state.sync.current_schedule.clone(),
        is_loading: state.sync.is_loading,
        is_offline: state.sync.is_offline,
        error: state.sync.last_error.clone(),
      }
    };
    self
      .lock_subscribers()
      .retain(|tx| tx.send(update.clone()).is_ok());
  }

  fn lock_state(&self) -> MutexGuard<'_, EngineState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<ScheduleUpdate>>> {
    self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
  }
}
