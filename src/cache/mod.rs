//! Generic caching layer for data persistence and offline support.
//!
//! This module provides:
//! - A key/value backend abstraction with SQLite and in-memory storage
//! - A TTL cache store with lazy eviction and prefix-scoped clearing
//! - Cache-first and network-first load strategies

pub mod layer;
mod storage;
mod store;
mod traits;

pub use layer::CacheLayer;
pub use storage::{KvBackend, MemoryStorage, SqliteStorage};
pub use store::{CacheEntry, CacheKey, CacheStore, MAX_ENTRY_BYTES};
pub use traits::{CacheResult, CacheSource, Clock, ManualClock, SystemClock};
