//! Cache layer that orchestrates load strategies with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::store::{CacheKey, CacheStore};
use super::traits::CacheResult;
use crate::error::SyncError;
use crate::network::NetworkMonitor;

/// Default TTL for schedule slices.
pub const SCHEDULE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default TTL for news.
pub const NEWS_TTL: Duration = Duration::from_secs(10 * 60);
/// Default TTL for homework lists.
pub const HOMEWORK_TTL: Duration = Duration::from_secs(5 * 60);
/// Default TTL for notifications.
pub const NOTIFICATIONS_TTL: Duration = Duration::from_secs(3 * 60);

/// Cache layer that decides between cached data and the network.
///
/// Screens use this for every plain data fetch (news, homework, notification
/// settings). The schedule engine has its own merge strategy and does not.
pub struct CacheLayer {
  store: Arc<CacheStore>,
  network: Arc<NetworkMonitor>,
}

impl CacheLayer {
  pub fn new(store: Arc<CacheStore>, network: Arc<NetworkMonitor>) -> Self {
    Self { store, network }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Unexpired cache entry - return immediately
  /// 2. Offline - fail with `NoDataAvailable`
  /// 3. Otherwise fetch, cache with `ttl`, return
  pub async fn cache_first<T, F, Fut>(
    &self,
    key: &CacheKey,
    ttl: Duration,
    loader: F,
  ) -> Result<CacheResult<T>, SyncError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
  {
    if let Some(cached) = self.store.get::<T>(key) {
      debug!(cache = %key, "Using cached data");
      return Ok(CacheResult::from_cache(cached));
    }

    if !self.network.is_connected() {
      debug!(cache = %key, "No network and no cached data");
      return Err(SyncError::no_data(format!(
        "no network connection and no cached {}",
        key
      )));
    }

    let data = loader().await.map_err(|e| {
      warn!(cache = %key, error = %e, "Failed to load data from network");
      e
    })?;
    self.store.put(key, &data, ttl);
    debug!(cache = %key, "Loaded and cached data");
    Ok(CacheResult::from_network(data))
  }

  /// Fetch with network-first strategy.
  ///
  /// 1. Online - try the network; on success cache and return
  /// 2. Offline or network failure - serve the cached entry
  /// 3. Neither - fail with `NoDataAvailable`
  pub async fn network_first<T, F, Fut>(
    &self,
    key: &CacheKey,
    ttl: Duration,
    loader: F,
  ) -> Result<CacheResult<T>, SyncError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
  {
    let mut network_error = None;

    if self.network.is_connected() {
      match loader().await {
        Ok(data) => {
          self.store.put(key, &data, ttl);
          return Ok(CacheResult::from_network(data));
        }
        Err(e) => {
          warn!(cache = %key, error = %e, "Network error, trying cache");
          network_error = Some(e);
        }
      }
    }

    if let Some(cached) = self.store.get::<T>(key) {
      debug!(cache = %key, "Using cached data due to network issues");
      return Ok(CacheResult::offline(cached));
    }

    Err(SyncError::no_data(match network_error {
      Some(e) => format!("{} unavailable ({}) and not cached", key, e),
      None => format!("no network connection and no cached {}", key),
    }))
  }
}
