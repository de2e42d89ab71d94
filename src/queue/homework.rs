//! Homework writes that fall back to the offline queue.

use std::sync::Arc;
use tracing::{debug, warn};

use super::mutation::{MutationKind, MutationSink};
use super::OfflineQueue;
use crate::error::SyncError;
use crate::network::NetworkMonitor;

/// What happened to a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
  /// Accepted by the server
  Submitted,
  /// Stored for replay; carries the queued mutation id
  Queued(String),
}

/// Sends homework writes straight to the server while online and records
/// them in the offline queue otherwise.
pub struct HomeworkWriter<S> {
  queue: Arc<OfflineQueue>,
  network: Arc<NetworkMonitor>,
  sink: Arc<S>,
}

impl<S: MutationSink> HomeworkWriter<S> {
  pub fn new(queue: Arc<OfflineQueue>, network: Arc<NetworkMonitor>, sink: Arc<S>) -> Self {
    Self {
      queue,
      network,
      sink,
    }
  }

  pub async fn add(
    &self,
    lesson_id: &str,
    group_id: &str,
    text: &str,
  ) -> Result<WriteOutcome, SyncError> {
    self
      .write(MutationKind::AddHomework {
        lesson_id: lesson_id.to_string(),
        group_id: group_id.to_string(),
        homework_text: text.to_string(),
      })
      .await
  }

  pub async fn update(
    &self,
    lesson_id: &str,
    group_id: &str,
    text: &str,
  ) -> Result<WriteOutcome, SyncError> {
    self
      .write(MutationKind::UpdateHomework {
        lesson_id: lesson_id.to_string(),
        group_id: group_id.to_string(),
        homework_text: text.to_string(),
      })
      .await
  }

  pub async fn delete(&self, lesson_id: &str, group_id: &str) -> Result<WriteOutcome, SyncError> {
    self
      .write(MutationKind::DeleteHomework {
        lesson_id: lesson_id.to_string(),
        group_id: group_id.to_string(),
      })
      .await
  }

  /// Transport failures are queued; a server rejection is returned as is.
  async fn write(&self, kind: MutationKind) -> Result<WriteOutcome, SyncError> {
    if !self.network.is_connected() {
      let queued = self.queue.enqueue(kind);
      debug!(id = %queued.id, "Offline, homework write queued");
      return Ok(WriteOutcome::Queued(queued.id));
    }

    let mutation = self.queue.prepare(kind);
    match self.sink.submit(&mutation).await {
      Ok(()) => Ok(WriteOutcome::Submitted),
      Err(e) if e.is_transient() => {
        warn!(id = %mutation.id, error = %e, "Homework write failed, queued for replay");
        let id = mutation.id.clone();
        self.queue.push(mutation);
        Ok(WriteOutcome::Queued(id))
      }
      Err(e) => Err(e),
    }
  }
}
