//! Queued write actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;

use crate::error::SyncError;

/// A homework write recorded while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
  AddHomework {
    lesson_id: String,
    group_id: String,
    homework_text: String,
  },
  UpdateHomework {
    lesson_id: String,
    group_id: String,
    homework_text: String,
  },
  DeleteHomework {
    lesson_id: String,
    group_id: String,
  },
}

impl MutationKind {
  pub fn action(&self) -> &'static str {
    match self {
      Self::AddHomework { .. } => "ADD_HOMEWORK",
      Self::UpdateHomework { .. } => "UPDATE_HOMEWORK",
      Self::DeleteHomework { .. } => "DELETE_HOMEWORK",
    }
  }

  pub fn lesson_id(&self) -> &str {
    match self {
      Self::AddHomework { lesson_id, .. }
      | Self::UpdateHomework { lesson_id, .. }
      | Self::DeleteHomework { lesson_id, .. } => lesson_id,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
  pub id: String,
  #[serde(flatten)]
  pub kind: MutationKind,
  pub enqueued_at: DateTime<Utc>,
}

impl QueuedMutation {
  /// Build a mutation whose id is a digest of its content, time and a
  /// caller-supplied sequence number.
  pub fn new(kind: MutationKind, enqueued_at: DateTime<Utc>, seq: u64) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(kind.action().as_bytes());
    hasher.update(kind.lesson_id().as_bytes());
    hasher.update(enqueued_at.timestamp_micros().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hasher.finalize();

    Self {
      id: hex::encode(&digest[..12]),
      kind,
      enqueued_at,
    }
  }
}

/// Server-side counterpart of a queued mutation.
pub trait MutationSink: Send + Sync {
  fn submit(
    &self,
    mutation: &QueuedMutation,
  ) -> impl Future<Output = Result<(), SyncError>> + Send;
}
