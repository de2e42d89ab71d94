//! End-to-end flow: a session online, a restart while offline, then
//! reconnecting.

use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use schedule_sync::cache::{CacheKey, CacheLayer, CacheSource, CacheStore, KvBackend, SqliteStorage};
use schedule_sync::network::{ConnectivityStatus, NetworkMonitor};
use schedule_sync::queue::{
  replay_on_reconnect, HomeworkWriter, MutationSink, OfflineQueue, QueuedMutation, WriteOutcome,
};
use schedule_sync::schedule::{
  layout_days, DisplayMode, GroupSelection, LessonRecord, LessonSource, ScheduleEngine, WeekWindow,
};
use schedule_sync::SyncError;

struct Server {
  lessons: Vec<LessonRecord>,
  reachable: Mutex<bool>,
  received: Mutex<Vec<String>>,
}

impl Server {
  fn new(lessons: Vec<LessonRecord>) -> Self {
    Self {
      lessons,
      reachable: Mutex::new(true),
      received: Mutex::new(Vec::new()),
    }
  }

  fn set_reachable(&self, reachable: bool) {
    *self.reachable.lock().unwrap() = reachable;
  }

  fn check(&self) -> Result<(), SyncError> {
    if *self.reachable.lock().unwrap() {
      Ok(())
    } else {
      Err(SyncError::Network("no route to host".into()))
    }
  }
}

impl LessonSource for Server {
  async fn fetch_lessons(
    &self,
    _group: &GroupSelection,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<LessonRecord>, SyncError> {
    self.check()?;
    Ok(
      self
        .lessons
        .iter()
        .filter(|l| from <= l.date && l.date <= to)
        .cloned()
        .collect(),
    )
  }
}

impl MutationSink for Server {
  async fn submit(&self, mutation: &QueuedMutation) -> Result<(), SyncError> {
    self.check()?;
    self
      .received
      .lock()
      .unwrap()
      .push(mutation.kind.lesson_id().to_string());
    Ok(())
  }
}

fn date(s: &str) -> NaiveDate {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn lesson(id: &str, day: &str, pair: u32) -> LessonRecord {
  LessonRecord {
    id: id.into(),
    date: date(day),
    starts_at: Some(format!("{:02}:00", 8 + pair)),
    ends_at: None,
    pair_number: Some(pair),
    title: "Mechanics".into(),
    teacher: "Kuznetsov".into(),
    room: "5-18".into(),
    lesson_type: "Lecture".into(),
    notes: None,
    group_id: "201".into(),
  }
}

fn group() -> GroupSelection {
  GroupSelection {
    faculty: "physics".into(),
    course: "2".into(),
    group: "201".into(),
  }
}

struct Session {
  network: Arc<NetworkMonitor>,
  store: Arc<CacheStore>,
  queue: Arc<OfflineQueue>,
  engine: Arc<ScheduleEngine<Server>>,
}

fn session(path: &std::path::Path, server: Arc<Server>, status: ConnectivityStatus) -> Session {
  let backend: Arc<dyn KvBackend> = Arc::new(SqliteStorage::open_at(path).unwrap());
  let network = Arc::new(NetworkMonitor::new(status));
  let store = Arc::new(CacheStore::new(backend.clone()));
  let queue = Arc::new(OfflineQueue::load(backend));
  let engine = Arc::new(ScheduleEngine::new(server, store.clone(), network.clone()));
  Session {
    network,
    store,
    queue,
    engine,
  }
}

#[tokio::test]
async fn test_schedule_and_writes_survive_offline_restart() {
  let dir = tempfile::tempdir().unwrap();
  let db = dir.path().join("store.db");
  let server = Arc::new(Server::new(vec![
    lesson("a", "2024-03-04", 1),
    lesson("b", "2024-03-04", 3),
    lesson("c", "2024-03-12", 2),
  ]));
  let week = WeekWindow::containing(date("2024-03-06"), DisplayMode::SixDay);

  // First run, online: load the week and let preload fetch the next one.
  {
    let s = session(&db, server.clone(), ConnectivityStatus::online());
    s.engine.select_group(group()).await;
    let navigation = s.engine.navigate(week).await;
    assert!(navigation.outcome.unwrap().fetched());
    navigation.preload.await.unwrap();

    let layer = CacheLayer::new(s.store.clone(), s.network.clone());
    let cached = layer
      .cache_first(&CacheKey::news(), Duration::from_secs(600), || async {
        Ok(vec!["Exam week moved".to_string()])
      })
      .await
      .unwrap();
    assert_eq!(cached.source, CacheSource::Network);
  }

  // Second run, offline: everything comes from disk.
  server.set_reachable(false);
  let s = session(&db, server.clone(), ConnectivityStatus::offline());
  s.engine.select_group(group()).await;

  let navigation = s.engine.navigate(week).await;
  let outcome = navigation.outcome.unwrap();
  assert!(outcome.fetch_error.is_some());
  assert!(navigation.preload.await.unwrap().skipped);

  let state = s.engine.snapshot();
  assert!(state.is_offline);
  assert_eq!(state.last_error, None);
  let days = layout_days(&state.current_schedule);
  assert_eq!(days.len(), 1);
  let ids: Vec<&str> = days[0].entries.iter().map(|e| e.id()).collect();
  assert_eq!(ids, vec!["a", "gap-2024-03-04-2", "b"]);

  // The preloaded next week is available offline too.
  s.engine.set_window(week.shift_weeks(1)).await;
  assert_eq!(s.engine.snapshot().current_schedule[0].id, "c");

  // Cached news is still served; homework was never cached.
  let layer = CacheLayer::new(s.store.clone(), s.network.clone());
  let news = layer
    .cache_first(&CacheKey::news(), Duration::from_secs(600), || async {
      Err::<Vec<String>, _>(SyncError::Network("unreachable".into()))
    })
    .await
    .unwrap();
  assert_eq!(news.source, CacheSource::Cache);
  let homework = layer
    .cache_first(&CacheKey::homework("201"), Duration::from_secs(300), || async {
      Ok(Vec::<String>::new())
    })
    .await;
  assert!(matches!(homework, Err(SyncError::NoDataAvailable(_))));

  // Writes made offline are queued and replayed once the network returns.
  let writer = HomeworkWriter::new(s.queue.clone(), s.network.clone(), server.clone());
  let outcome = writer.add("a", "201", "Problems 1-5").await.unwrap();
  assert!(matches!(outcome, WriteOutcome::Queued(_)));
  writer.delete("b", "201").await.unwrap();
  assert_eq!(s.queue.len(), 2);

  let replay = replay_on_reconnect(s.queue.clone(), &s.network, server.clone());
  server.set_reachable(true);
  s.network.report(ConnectivityStatus {
    connected: true,
    reachable: None,
  });
  for _ in 0..100 {
    if s.queue.is_empty() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  replay.abort();

  assert!(s.queue.is_empty());
  assert_eq!(*server.received.lock().unwrap(), vec!["a", "b"]);

  // Back online, a refresh clears the offline flag.
  s.engine.set_window(week).await;
  s.engine.refresh().await.unwrap();
  assert!(!s.engine.snapshot().is_offline);
}
