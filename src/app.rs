//! Wires storage, network state, the queue and the engine together and
//! implements the CLI commands on top of them.

use chrono::{Local, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use schedule_sync::api::ApiClient;
use schedule_sync::cache::{CacheKey, CacheLayer, CacheSource, CacheStore, KvBackend, SqliteStorage};
use schedule_sync::config::Config;
use schedule_sync::network::{ConnectivityStatus, NetworkMonitor};
use schedule_sync::queue::{HomeworkWriter, OfflineQueue, WriteOutcome};
use schedule_sync::schedule::{layout_days, DayEntry, ScheduleEngine, WeekWindow};

pub struct App {
  config: Config,
  network: Arc<NetworkMonitor>,
  store: Arc<CacheStore>,
  queue: Arc<OfflineQueue>,
  api: Arc<ApiClient>,
  cache: CacheLayer,
  engine: Arc<ScheduleEngine<ApiClient>>,
  writer: HomeworkWriter<ApiClient>,
}

impl App {
  pub fn new(config: Config, offline: bool) -> Result<Self> {
    let storage = match &config.database_path {
      Some(path) => SqliteStorage::open_at(path)?,
      None => SqliteStorage::open()?,
    };
    let backend: Arc<dyn KvBackend> = Arc::new(storage);

    let status = if offline {
      ConnectivityStatus::offline()
    } else {
      ConnectivityStatus::online()
    };
    let network = Arc::new(NetworkMonitor::new(status));
    let store = Arc::new(CacheStore::new(backend.clone()));
    let queue = Arc::new(OfflineQueue::load(backend));
    let api = Arc::new(ApiClient::new(&config.api.url, config.api_token())?);

    let cache = CacheLayer::new(store.clone(), network.clone());
    let engine = Arc::new(
      ScheduleEngine::new(api.clone(), store.clone(), network.clone())
        .with_policy(config.refresh_policy())
        .with_dataset_ttl(config.cache.schedule_ttl()),
    );
    engine.watch_network();
    let writer = HomeworkWriter::new(queue.clone(), network.clone(), api.clone());

    Ok(Self {
      config,
      network,
      store,
      queue,
      api,
      cache,
      engine,
      writer,
    })
  }

  fn group_id(&self) -> &str {
    &self.config.group.group
  }

  /// Show one week of the configured group's schedule.
  pub async fn week(&self, date: Option<NaiveDate>, offset: i64, refresh: bool) -> Result<()> {
    let anchor = date.unwrap_or_else(|| Local::now().date_naive());
    let window = WeekWindow::containing(anchor, self.config.display_mode).shift_weeks(offset);
    self.engine.select_group(self.config.group.clone()).await;

    let outcome = if refresh {
      self.engine.set_window(window).await;
      self.engine.refresh().await
    } else {
      let navigation = self.engine.navigate(window).await;
      let report = navigation
        .preload
        .await
        .map_err(|e| eyre!("Preload task failed: {}", e))?;
      debug!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        skipped = report.skipped,
        "Preload report"
      );
      navigation.outcome
    };

    let state = self.engine.snapshot();
    let mut header = format!("Week {} | group {}", window, self.group_id());
    if state.is_offline {
      header.push_str(" | offline");
    }
    if let Some(at) = state.last_synced_at {
      header.push_str(&format!(" | synced {}", at.with_timezone(&Local).format("%H:%M")));
    }
    println!("{}", header);

    let outcome = outcome.map_err(|e| eyre!("{}", e))?;
    if let Some(e) = &outcome.fetch_error {
      println!("(showing saved schedule: {})", e);
    }

    let days = layout_days(&state.current_schedule);
    if days.is_empty() {
      println!("No lessons this week");
    }
    for day in days {
      println!();
      println!("{}", day.date.format("%A, %d %B"));
      for entry in day.entries {
        match entry {
          DayEntry::Lesson(lesson) => {
            let pair = lesson
              .pair_number
              .map(|n| format!("{}.", n))
              .unwrap_or_else(|| "-".to_string());
            println!(
              "  {:>3} {:<15} {} ({}) | {} | {}",
              pair,
              lesson.time_label(),
              lesson.title,
              lesson.lesson_type,
              lesson.teacher,
              lesson.room
            );
            if let Some(notes) = lesson.notes.filter(|n| !n.is_empty()) {
              println!("      {}", notes);
            }
          }
          DayEntry::FreePeriod { pair_number, .. } => {
            println!("  {:>3} free", format!("{}.", pair_number));
          }
        }
      }
    }
    Ok(())
  }

  /// List the group's homework, preferring fresh data.
  pub async fn homework(&self) -> Result<()> {
    let group_id = self.group_id();
    let result = self
      .cache
      .network_first(
        &CacheKey::homework(group_id),
        self.config.cache.homework_ttl(),
        || self.api.get_group_homework(group_id),
      )
      .await
      .map_err(|e| eyre!("{}", e))?;

    println!("Homework for {}{}", group_id, source_note(result.source));
    if result.data.is_empty() {
      println!("Nothing assigned");
    }
    for task in result.data {
      println!("  [{}] {}", task.lesson_id, task.homework_text);
    }
    Ok(())
  }

  /// Show notification settings, served from cache while fresh.
  pub async fn settings(&self) -> Result<()> {
    let result = self
      .cache
      .cache_first(
        &CacheKey::notification_settings(),
        self.config.cache.notifications_ttl(),
        || self.api.get_notification_settings(),
      )
      .await
      .map_err(|e| eyre!("{}", e))?;

    let s = result.data;
    println!("Notification settings{}", source_note(result.source));
    println!("  enabled:  {}", s.notifications_enabled);
    println!("  homework: {}", s.homework_notifications);
    println!("  schedule: {}", s.schedule_notifications);
    println!("  group:    {}", s.group_notifications);
    println!("  system:   {}", s.system_notifications);
    println!("  reminder: {}", s.reminder_notifications);
    if let (Some(start), Some(end)) = (&s.quiet_hours_start, &s.quiet_hours_end) {
      println!("  quiet hours: {} - {}", start, end);
    }
    println!("  language: {}", s.language);
    Ok(())
  }

  pub async fn add_homework(&self, lesson: &str, text: &str) -> Result<()> {
    let outcome = self
      .writer
      .add(lesson, self.group_id(), text)
      .await
      .map_err(|e| eyre!("Failed to add homework: {}", e))?;
    report_write(outcome);
    Ok(())
  }

  pub async fn update_homework(&self, lesson: &str, text: &str) -> Result<()> {
    let outcome = self
      .writer
      .update(lesson, self.group_id(), text)
      .await
      .map_err(|e| eyre!("Failed to update homework: {}", e))?;
    report_write(outcome);
    Ok(())
  }

  pub async fn delete_homework(&self, lesson: &str) -> Result<()> {
    let outcome = self
      .writer
      .delete(lesson, self.group_id())
      .await
      .map_err(|e| eyre!("Failed to delete homework: {}", e))?;
    report_write(outcome);
    Ok(())
  }

  /// Replay queued writes.
  pub async fn flush(&self) -> Result<()> {
    if !self.network.is_connected() {
      println!("Offline, {} pending write(s) kept", self.queue.len());
      return Ok(());
    }

    let report = self.queue.flush(self.api.as_ref()).await;
    println!(
      "Replayed {}, failed {}, pending {}",
      report.replayed.len(),
      report.failed.len(),
      self.queue.len()
    );
    if !report.failed.is_empty() {
      return Err(eyre!("{} write(s) could not be replayed", report.failed.len()));
    }
    Ok(())
  }

  pub fn clear_cache(&self, prefix: Option<&str>) {
    self.store.clear(prefix);
    info!(prefix = ?prefix, "Cache cleared by user");
    match prefix {
      Some(p) => println!("Cleared cache entries starting with {}", p),
      None => println!("Cleared cache"),
    }
  }

  pub fn cache_info(&self) {
    println!("Cache size:     {} bytes", self.store.size_bytes());
    println!("Pending writes: {}", self.queue.len());
    for mutation in self.queue.pending() {
      println!(
        "  {} {} lesson {} ({})",
        mutation.id,
        mutation.kind.action(),
        mutation.kind.lesson_id(),
        mutation.enqueued_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
      );
    }
  }
}

fn source_note(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Network => "",
    CacheSource::Cache => " (cached)",
    CacheSource::Offline => " (offline copy)",
  }
}

fn report_write(outcome: WriteOutcome) {
  match outcome {
    WriteOutcome::Submitted => println!("Saved"),
    WriteOutcome::Queued(id) => println!("Offline, queued as {}", id),
  }
}
