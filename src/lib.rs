//! Offline-first synchronization and caching for a student schedule client.
//!
//! The pieces are constructed explicitly and shared through `Arc`:
//! a [`cache::CacheStore`] over a [`cache::KvBackend`], a
//! [`network::NetworkMonitor`], an [`queue::OfflineQueue`] and the
//! [`schedule::ScheduleEngine`]. [`api::ApiClient`] talks to the server.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod queue;
pub mod schedule;

pub use error::SyncError;
