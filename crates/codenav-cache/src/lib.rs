//! Bounded caching and asynchronous persistence for codenav.
//!
//! Three pieces live here:
//!
//! - [`LruCache`]: a thread-safe least-recently-used map bounded by entry
//!   count and approximate memory, with hit/miss statistics
//! - versioned cache files ([`save_cache`] / [`load_cache`]): a serialized
//!   `[version_stamp, payload]` container where a version mismatch discards
//!   the file instead of surfacing stale data
//! - [`AsyncCachePersister`]: a background worker that debounces cache
//!   writes so persistence never sits on the request path

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod file;
mod lru;
mod persist;

pub use file::{load_cache, save_cache};
pub use lru::{CacheConfig, CacheStats, LruCache};
pub use persist::AsyncCachePersister;
