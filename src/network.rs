//! Connectivity tracking.
//!
//! The platform's connectivity provider reports raw transport status through
//! [`NetworkMonitor::report`]; consumers read the derived online flag or
//! subscribe to transitions.

use tokio::sync::watch;
use tracing::info;

/// Raw status as delivered by a connectivity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
  /// Transport-level connectivity
  pub connected: bool,
  /// Internet reachability, `None` when the transport cannot probe it
  pub reachable: Option<bool>,
}

impl ConnectivityStatus {
  pub fn online() -> Self {
    Self {
      connected: true,
      reachable: Some(true),
    }
  }

  pub fn offline() -> Self {
    Self {
      connected: false,
      reachable: None,
    }
  }

  /// Unknown reachability counts as reachable.
  pub fn is_online(&self) -> bool {
    self.connected && self.reachable != Some(false)
  }
}

/// Shared connectivity state with change notifications.
#[derive(Debug)]
pub struct NetworkMonitor {
  tx: watch::Sender<bool>,
}

impl NetworkMonitor {
  pub fn new(initial: ConnectivityStatus) -> Self {
    let (tx, _rx) = watch::channel(initial.is_online());
    Self { tx }
  }

  /// Record a new provider status. Subscribers are notified only when the
  /// derived online flag changes.
  pub fn report(&self, status: ConnectivityStatus) {
    let online = status.is_online();
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });

    if changed {
      info!(
        online,
        connected = status.connected,
        reachable = ?status.reachable,
        "Network status changed"
      );
    }
  }

  pub fn is_connected(&self) -> bool {
    *self.tx.borrow()
  }

  /// Receiver that wakes on every online/offline transition.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for NetworkMonitor {
  fn default() -> Self {
    Self::new(ConnectivityStatus::online())
  }
}
