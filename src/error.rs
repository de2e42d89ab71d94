//! Error taxonomy shared by the load strategies, the offline queue and the
//! schedule engine.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  /// Transport failure; retried only by the next refresh trigger.
  #[error("Network error: {0}")]
  Network(String),

  #[error("Request rejected ({status}): {message}")]
  Rejected { status: u16, message: String },

  /// Neither the cache nor the network produced data.
  #[error("No data available: {0}")]
  NoDataAvailable(String),

  #[error("Invalid window: {start} is after {end}")]
  InvalidWindow { start: NaiveDate, end: NaiveDate },

  #[error("No group selected")]
  NoGroupSelected,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl SyncError {
  /// Whether the failure came from the transport rather than the server's answer.
  pub fn is_transient(&self) -> bool {
    matches!(self, SyncError::Network(_))
  }

  pub fn no_data(what: impl Into<String>) -> Self {
    SyncError::NoDataAvailable(what.into())
  }

  pub fn from_status(status: u16, body: &str) -> Self {
    let message = if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      let mut cut = MAX_ERROR_BODY_LENGTH;
      while !body.is_char_boundary(cut) {
        cut -= 1;
      }
      format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    };
    match status {
      500..=599 => SyncError::Network(format!("server error {}: {}", status, message)),
      _ => SyncError::Rejected { status, message },
    }
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    match e.status() {
      Some(status) => SyncError::from_status(status.as_u16(), &e.to_string()),
      None => SyncError::Network(e.to_string()),
    }
  }
}
