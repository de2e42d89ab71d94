//! TTL key/value cache on top of a [`KvBackend`].

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::KvBackend;
use super::traits::{Clock, SystemClock};

/// Backend prefix under which every cache entry lives.
const CACHE_PREFIX: &str = "cache:";

/// Largest serialized entry the store accepts.
pub const MAX_ENTRY_BYTES: usize = 4 * 1024 * 1024;

/// Namespaced cache key. Each constructor owns one semantic domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn schedule(group_id: &str) -> Self {
    Self(format!("schedule:{}", group_id))
  }

  pub fn news() -> Self {
    Self("news".to_string())
  }

  pub fn homework(group_id: &str) -> Self {
    Self(format!("homework:{}", group_id))
  }

  pub fn notifications() -> Self {
    Self("notifications".to_string())
  }

  pub fn notification_settings() -> Self {
    Self("notification_settings".to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  fn storage_key(&self) -> String {
    format!("{}{}", CACHE_PREFIX, self.0)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
  pub payload: serde_json::Value,
  pub stored_at: DateTime<Utc>,
  pub ttl_ms: u64,
}

impl CacheEntry {
  pub fn ttl(&self) -> Duration {
    Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX))
  }

  /// Valid iff `now - stored_at < ttl`.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    now - self.stored_at < self.ttl()
  }
}

/// Best-effort TTL cache. Nothing here fails the caller: storage and
/// serialization problems are logged and reported as a miss.
pub struct CacheStore {
  backend: Arc<dyn KvBackend>,
  clock: Arc<dyn Clock>,
}

impl CacheStore {
  pub fn new(backend: Arc<dyn KvBackend>) -> Self {
    Self::with_clock(backend, Arc::new(SystemClock))
  }

  pub fn with_clock(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
    Self { backend, clock }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Store `value` under `key`, replacing any existing entry.
  pub fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: std::time::Duration) {
    let payload = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(e) => {
        warn!(cache = %key, error = %e, "Failed to serialize cache payload");
        return;
      }
    };

    let entry = CacheEntry {
      payload,
      stored_at: self.clock.now(),
      ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
    };

    let bytes = match serde_json::to_vec(&entry) {
      Ok(b) => b,
      Err(e) => {
        warn!(cache = %key, error = %e, "Failed to encode cache entry");
        return;
      }
    };

    if bytes.len() > MAX_ENTRY_BYTES {
      warn!(cache = %key, size = bytes.len(), "Cache entry exceeds size limit, not stored");
      return;
    }

    match self.backend.set(&key.storage_key(), &bytes) {
      Ok(()) => debug!(cache = %key, size = bytes.len(), "Cached data"),
      Err(e) => warn!(cache = %key, error = %e, "Failed to write cache entry"),
    }
  }

  /// Fetch the payload for `key` if present and unexpired.
  ///
  /// Expired and malformed entries are deleted as a side effect.
  pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
    let storage_key = key.storage_key();
    let bytes = match self.backend.get(&storage_key) {
      Ok(Some(b)) => b,
      Ok(None) => return None,
      Err(e) => {
        warn!(cache = %key, error = %e, "Failed to read cache entry");
        return None;
      }
    };

    let entry: CacheEntry = match serde_json::from_slice(&bytes) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(cache = %key, error = %e, "Dropping malformed cache entry");
        self.evict(&storage_key);
        return None;
      }
    };

    if !entry.is_valid_at(self.clock.now()) {
      debug!(cache = %key, stored_at = %entry.stored_at, "Cache entry expired");
      self.evict(&storage_key);
      return None;
    }

    match serde_json::from_value(entry.payload) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(cache = %key, error = %e, "Dropping cache entry with unexpected shape");
        self.evict(&storage_key);
        None
      }
    }
  }

  /// Remove `key` if present.
  pub fn remove(&self, key: &CacheKey) {
    self.evict(&key.storage_key());
  }

  /// Remove all cache entries, or only those whose key starts with `prefix`.
  pub fn clear(&self, prefix: Option<&str>) {
    let scope = format!("{}{}", CACHE_PREFIX, prefix.unwrap_or(""));
    match self.backend.keys_with_prefix(&scope) {
      Ok(keys) => {
        for key in &keys {
          self.evict(key);
        }
        debug!(prefix = %scope, removed = keys.len(), "Cache cleared");
      }
      Err(e) => warn!(prefix = %scope, error = %e, "Failed to list cache keys"),
    }
  }

  /// Total serialized size of all cache entries, in bytes.
  pub fn size_bytes(&self) -> usize {
    let keys = match self.backend.keys_with_prefix(CACHE_PREFIX) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "Failed to list cache keys");
        return 0;
      }
    };

    keys
      .iter()
      .filter_map(|k| self.backend.get(k).ok().flatten())
      .map(|bytes| bytes.len())
      .sum()
  }

  fn evict(&self, storage_key: &str) {
    if let Err(e) = self.backend.delete(storage_key) {
      warn!(key = storage_key, error = %e, "Failed to delete cache entry");
    }
  }
}
