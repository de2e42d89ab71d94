//! Durable FIFO of writes made while offline, replayed on reconnect.

mod homework;
mod mutation;

pub use homework::{HomeworkWriter, WriteOutcome};
pub use mutation::{MutationKind, MutationSink, QueuedMutation};

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::KvBackend;
use crate::network::NetworkMonitor;

/// Backend key holding the serialized queue.
const QUEUE_KEY: &str = "queue:offline";

/// Outcome of one flush pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
  /// Ids replayed successfully, in replay order
  pub replayed: Vec<String>,
  /// Ids that failed and were put back at the end of the queue
  pub failed: Vec<String>,
  /// True when another flush was already running
  pub skipped: bool,
}

#[derive(Default)]
struct QueueState {
  /// Taken by a running flush and not yet settled
  in_flight: Vec<QueuedMutation>,
  /// Live queue
  items: Vec<QueuedMutation>,
}

/// Persisted queue of pending mutations.
pub struct OfflineQueue {
  backend: Arc<dyn KvBackend>,
  state: Mutex<QueueState>,
  flushing: AtomicBool,
  seq: AtomicU64,
}

/// Clears the flush flag when dropped.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

impl OfflineQueue {
  /// Restore the queue from `backend`. A missing or unreadable queue starts empty.
  pub fn load(backend: Arc<dyn KvBackend>) -> Self {
    let items = match backend.get(QUEUE_KEY) {
      Ok(Some(bytes)) => match serde_json::from_slice::<Vec<QueuedMutation>>(&bytes) {
        Ok(items) => {
          info!(count = items.len(), "Loaded offline queue");
          items
        }
        Err(e) => {
          warn!(error = %e, "Discarding malformed offline queue");
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(error = %e, "Failed to read offline queue");
        Vec::new()
      }
    };

    Self {
      backend,
      state: Mutex::new(QueueState {
        in_flight: Vec::new(),
        items,
      }),
      flushing: AtomicBool::new(false),
      seq: AtomicU64::new(0),
    }
  }

  /// Build a mutation with a fresh id without queueing it.
  pub fn prepare(&self, kind: MutationKind) -> QueuedMutation {
    let seq = self.seq.fetch_add(1, Ordering::Relaxed);
    QueuedMutation::new(kind, Utc::now(), seq)
  }

  /// Append a new mutation and persist. Never touches the network.
  pub fn enqueue(&self, kind: MutationKind) -> QueuedMutation {
    let mutation = self.prepare(kind);
    self.push(mutation.clone());
    mutation
  }

  /// Append an already prepared mutation and persist.
  pub fn push(&self, mutation: QueuedMutation) {
    let mut state = self.lock();
    debug!(id = %mutation.id, action = mutation.kind.action(), "Added to offline queue");
    state.items.push(mutation);
    self.persist(&state);
  }

  pub fn len(&self) -> usize {
    self.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().items.is_empty()
  }

  /// Snapshot of the pending mutations in queue order.
  pub fn pending(&self) -> Vec<QueuedMutation> {
    self.lock().items.clone()
  }

  pub fn clear(&self) {
    let mut state = self.lock();
    state.items.clear();
    self.persist(&state);
  }

  /// Replay the queue through `sink`.
  ///
  /// The current contents are taken as a snapshot and the live queue is
  /// emptied; the snapshot is replayed sequentially in enqueue order. A
  /// failed item is appended to the live queue again, behind anything
  /// enqueued while the flush was running. Overlapping calls are no-ops.
  ///
  /// Storage keeps every unsettled item of the snapshot until it has been
  /// submitted, so a crash mid-flush loses nothing.
  pub async fn flush<S: MutationSink>(&self, sink: &S) -> FlushReport {
    if self
      .flushing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("Flush already in progress, skipping");
      return FlushReport {
        skipped: true,
        ..FlushReport::default()
      };
    }
    let _guard = FlushGuard(&self.flushing);

    let count = {
      let mut state = self.lock();
      state.in_flight = std::mem::take(&mut state.items);
      state.in_flight.len()
    };

    let mut report = FlushReport::default();
    if count == 0 {
      return report;
    }
    info!(count, "Processing offline queue");

    loop {
      let next = self.lock().in_flight.first().cloned();
      let Some(mutation) = next else {
        break;
      };
      let result = sink.submit(&mutation).await;

      let mut state = self.lock();
      state.in_flight.remove(0);
      match result {
        Ok(()) => {
          debug!(id = %mutation.id, action = mutation.kind.action(), "Replayed queued mutation");
          report.replayed.push(mutation.id);
        }
        Err(e) => {
          warn!(id = %mutation.id, action = mutation.kind.action(), error = %e, "Replay failed, requeueing");
          report.failed.push(mutation.id.clone());
          state.items.push(mutation);
        }
      }
      self.persist(&state);
    }

    info!(
      replayed = report.replayed.len(),
      failed = report.failed.len(),
      "Offline queue processed"
    );
    report
  }

  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Write unsettled in-flight items followed by the live queue.
  fn persist(&self, state: &QueueState) {
    let items: Vec<&QueuedMutation> = state.in_flight.iter().chain(&state.items).collect();
    let result = serde_json::to_vec(&items)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize offline queue: {}", e))
      .and_then(|bytes| self.backend.set(QUEUE_KEY, &bytes));
    if let Err(e) = result {
      warn!(error = %e, "Error saving offline queue");
    }
  }
}

/// Spawn a task that flushes `queue` right away when `monitor` is already
/// online, then on every transition to online.
pub fn replay_on_reconnect<S>(
  queue: Arc<OfflineQueue>,
  monitor: &NetworkMonitor,
  sink: Arc<S>,
) -> JoinHandle<()>
where
  S: MutationSink + 'static,
{
  let mut rx = monitor.subscribe();
  tokio::spawn(async move {
    loop {
      let online = *rx.borrow_and_update();
      if online {
        queue.flush(sink.as_ref()).await;
      }
      if rx.changed().await.is_err() {
        break;
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::error::SyncError;
  use crate::network::ConnectivityStatus;
  use std::collections::HashSet;
  use std::time::Duration;

  /// Records submissions; fails for lessons listed in `failing`.
  #[derive(Default)]
  struct RecordingSink {
    seen: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
  }

  impl MutationSink for RecordingSink {
    async fn submit(&self, mutation: &QueuedMutation) -> Result<(), SyncError> {
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      let lesson = mutation.kind.lesson_id().to_string();
      self.seen.lock().unwrap().push(lesson.clone());
      if self.failing.contains(&lesson) {
        Err(SyncError::Network("connection reset".into()))
      } else {
        Ok(())
      }
    }
  }

  fn delete(lesson: &str) -> MutationKind {
    MutationKind::DeleteHomework {
      lesson_id: lesson.to_string(),
      group_id: "g1".to_string(),
    }
  }

  fn lessons(items: &[QueuedMutation]) -> Vec<String> {
    items.iter().map(|m| m.kind.lesson_id().to_string()).collect()
  }

  #[tokio::test]
  async fn test_flush_replays_in_enqueue_order() {
    let queue = OfflineQueue::load(Arc::new(MemoryStorage::new()));
    for lesson in ["a", "b", "c"] {
      queue.enqueue(delete(lesson));
    }

    let sink = RecordingSink::default();
    let report = queue.flush(&sink).await;

    assert_eq!(*sink.seen.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(report.replayed.len(), 3);
    assert!(report.failed.is_empty());
    assert!(queue.is_empty());
  }

  #[tokio::test]
  async fn test_failed_item_is_requeued_at_the_end() {
    let queue = OfflineQueue::load(Arc::new(MemoryStorage::new()));
    for lesson in ["a", "b", "c"] {
      queue.enqueue(delete(lesson));
    }

    let sink = RecordingSink {
      failing: HashSet::from(["b".to_string()]),
      ..RecordingSink::default()
    };
    let report = queue.flush(&sink).await;

    assert_eq!(report.replayed.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(lessons(&queue.pending()), vec!["b"]);
  }

  #[tokio::test]
  async fn test_failed_item_lands_behind_items_enqueued_during_flush() {
    let queue = Arc::new(OfflineQueue::load(Arc::new(MemoryStorage::new())));
    queue.enqueue(delete("a"));
    queue.enqueue(delete("b"));

    let sink = Arc::new(RecordingSink {
      failing: HashSet::from(["a".to_string()]),
      delay: Some(Duration::from_millis(20)),
      ..RecordingSink::default()
    });

    let flushing = {
      let queue = queue.clone();
      let sink = sink.clone();
      tokio::spawn(async move { queue.flush(sink.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    queue.enqueue(delete("late"));

    flushing.await.unwrap();
    assert_eq!(lessons(&queue.pending()), vec!["late", "a"]);
  }

  #[tokio::test]
  async fn test_overlapping_flush_is_noop() {
    let queue = Arc::new(OfflineQueue::load(Arc::new(MemoryStorage::new())));
    queue.enqueue(delete("a"));

    let sink = Arc::new(RecordingSink {
      delay: Some(Duration::from_millis(30)),
      ..RecordingSink::default()
    });

    let first = {
      let queue = queue.clone();
      let sink = sink.clone();
      tokio::spawn(async move { queue.flush(sink.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = queue.flush(sink.as_ref()).await;
    assert!(second.skipped);

    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(sink.seen.lock().unwrap().len(), 1);

    // Guard is released once the first flush finishes
    let third = queue.flush(sink.as_ref()).await;
    assert!(!third.skipped);
  }

  #[test]
  fn test_queue_survives_reload() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryStorage::new());
    let queue = OfflineQueue::load(backend.clone());
    let first = queue.enqueue(delete("a"));
    queue.enqueue(delete("b"));

    let reloaded = OfflineQueue::load(backend);
    let pending = reloaded.pending();
    assert_eq!(lessons(&pending), vec!["a", "b"]);
    assert_eq!(pending[0], first);
  }

  #[tokio::test]
  async fn test_unsettled_items_stay_persisted_during_flush() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryStorage::new());
    let queue = Arc::new(OfflineQueue::load(backend.clone()));
    for lesson in ["a", "b", "c"] {
      queue.enqueue(delete(lesson));
    }

    let sink = Arc::new(RecordingSink {
      failing: HashSet::from(["a".to_string()]),
      delay: Some(Duration::from_millis(40)),
      ..RecordingSink::default()
    });
    let flushing = {
      let queue = queue.clone();
      let sink = sink.clone();
      tokio::spawn(async move { queue.flush(sink.as_ref()).await })
    };

    // Nothing settled yet: a restart would still see all three
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.is_empty());
    assert_eq!(
      lessons(&OfflineQueue::load(backend.clone()).pending()),
      vec!["a", "b", "c"]
    );

    // "a" failed and was requeued; "b" is still being submitted
    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.enqueue(delete("late"));
    assert_eq!(
      lessons(&OfflineQueue::load(backend.clone()).pending()),
      vec!["b", "c", "a", "late"]
    );

    flushing.await.unwrap();
    assert_eq!(lessons(&OfflineQueue::load(backend).pending()), vec!["a", "late"]);
  }

  #[test]
  fn test_malformed_persisted_queue_starts_empty() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryStorage::new());
    backend.set(QUEUE_KEY, b"not json").unwrap();
    assert!(OfflineQueue::load(backend).is_empty());
  }

  #[tokio::test]
  async fn test_replays_when_connection_returns() {
    let monitor = NetworkMonitor::new(ConnectivityStatus::offline());
    let queue = Arc::new(OfflineQueue::load(Arc::new(MemoryStorage::new())));
    queue.enqueue(delete("a"));

    let sink = Arc::new(RecordingSink::default());
    let handle = replay_on_reconnect(queue.clone(), &monitor, sink.clone());

    monitor.report(ConnectivityStatus::online());
    for _ in 0..50 {
      if queue.is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(queue.is_empty());
    assert_eq!(*sink.seen.lock().unwrap(), vec!["a"]);
    handle.abort();
  }

  #[tokio::test]
  async fn test_restored_queue_replays_at_startup_when_online() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryStorage::new());
    OfflineQueue::load(backend.clone()).enqueue(delete("a"));

    let monitor = NetworkMonitor::new(ConnectivityStatus::online());
    let queue = Arc::new(OfflineQueue::load(backend));
    let sink = Arc::new(RecordingSink::default());
    let handle = replay_on_reconnect(queue.clone(), &monitor, sink.clone());

    for _ in 0..50 {
      if queue.is_empty() && !sink.seen.lock().unwrap().is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(queue.is_empty());
    assert_eq!(*sink.seen.lock().unwrap(), vec!["a"]);
    handle.abort();
  }
}
