//! Response caching for fast and offline data access.
//!
//! This module provides the `CacheStore`, a bounded in-memory cache keyed by
//! request signature, optionally mirrored to a `DurableStore` (JSON files in
//! the cache directory). Every entry carries its own TTL and is treated as
//! absent once it has expired.
//!
//! The durable layer is disposable derived data: when it is unavailable the
//! store silently keeps working from memory.

pub mod durable;
pub mod entry;
pub mod store;

pub use durable::{CacheError, DiskStore, DurableStore};
pub use entry::CacheEntry;
pub use store::{CacheStats, CacheStore, DEFAULT_MAX_ENTRIES};
