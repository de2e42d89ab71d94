//! Schedule server adapter: lessons, homework writes and notification settings.

mod api_types;
mod client;
mod types;

pub use api_types::normalize_date;
pub use client::ApiClient;
pub use types::{HomeworkTask, NotificationSettings};
