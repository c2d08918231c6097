//! # Response caching
//!
//! Successful response bodies are held in an in-memory [`BoundedCache`]: a
//! mutex-isolated LRU container bounded by both a maximum entry count and a
//! maximum aggregate cost (the sum of caller-assigned entry weights, typically
//! byte sizes).
//!
//! The [`RequestCoordinator`](crate::RequestCoordinator) does not depend on
//! the concrete container but on the [`NetworkCache`] trait, so embedders can
//! swap in their own store. Only four verbs cross that boundary: `get`, `set`,
//! `remove` and `clear`. The cache never persists anything across process
//! restarts.
//!
//! ### Metrics
//!
//! - `cache.hit` / `cache.miss`: lookups served / not served by the cache.
//! - `cache.eviction`: entries evicted to restore the configured limits.

use bytes::Bytes;

use crate::fetch::RequestKey;

mod bounded;
#[cfg(test)]
mod tests;

pub use bounded::BoundedCache;

/// The cache surface the coordinator consumes.
///
/// Implementations must serialize their four operations: no caller may
/// observe a partially evicted state.
pub trait NetworkCache: Send + Sync {
    /// Returns the cached body for `key`, refreshing its recency.
    fn get(&self, key: &RequestKey) -> Option<Bytes>;

    /// Stores a response body under `key`.
    fn set(&self, key: RequestKey, body: Bytes);

    /// Removes the entry for `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &RequestKey);

    /// Drops all entries.
    fn clear(&self);
}

impl NetworkCache for BoundedCache<RequestKey, Bytes> {
    fn get(&self, key: &RequestKey) -> Option<Bytes> {
        BoundedCache::get(self, key)
    }

    fn set(&self, key: RequestKey, body: Bytes) {
        let cost = body.len() as u64;
        BoundedCache::set(self, key, body, cost);
    }

    fn remove(&self, key: &RequestKey) {
        BoundedCache::remove(self, key);
    }

    fn clear(&self) {
        BoundedCache::clear(self);
    }
}
