#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use fetchlane_core::SerializedState;
use jiff::Timestamp;
use tokio::task::AbortHandle;

/// Tracing target for cache operations.
pub const TRACING_TARGET: &str = "fetchlane_cache";

/// Expiry window applied when the caller does not configure one.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_millis(300_000);

struct CacheEntry {
    parallel_results: HashMap<String, SerializedState>,
    current_parallel_key: String,
    written_at: Timestamp,
    expiry: AbortHandle,
}

/// A read-only copy of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// Serialized slot state per parallel key.
    pub parallel_results: HashMap<String, SerializedState>,
    /// The parallel key that was current at the last write.
    pub current_parallel_key: String,
    /// When the entry was last written.
    pub written_at: Timestamp,
}

/// Time-bounded persistence for request state, keyed by a caller-chosen
/// cache identity.
///
/// Every write replaces the entry for its identity and reschedules the
/// expiry timer from the write time, so the entry stays alive for a full
/// window after the *last* write. Reads never touch the timer. Expiry
/// removes the entry with all of its parallel-key sub-entries.
///
/// Entry timers must be scheduled from within a tokio runtime; the engine
/// only writes from async context.
#[derive(Clone, Default)]
pub struct SlidingCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl SlidingCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide cache instance.
    ///
    /// Stores share this instance unless one is injected through the engine
    /// options, which tests do to stay isolated.
    pub fn global() -> &'static SlidingCache {
        static GLOBAL: OnceLock<SlidingCache> = OnceLock::new();
        GLOBAL.get_or_init(SlidingCache::new)
    }

    /// Writes the serialized state for one parallel key.
    ///
    /// No-op when `cache_id` is empty. All other parallel-key sub-entries of
    /// the identity are kept; `current_parallel_key` moves to `parallel_key`
    /// and the expiry timer restarts at `ttl` from now.
    pub fn update(
        &self,
        cache_id: &str,
        state: SerializedState,
        ttl: Duration,
        parallel_key: &str,
    ) {
        if cache_id.is_empty() {
            return;
        }

        let mut entries = self.entries.lock().unwrap();

        let mut parallel_results = match entries.remove(cache_id) {
            Some(old) => {
                old.expiry.abort();
                old.parallel_results
            }
            None => HashMap::new(),
        };
        parallel_results.insert(parallel_key.to_owned(), state);

        let expiry = {
            let entries = Arc::downgrade(&self.entries);
            let cache_id = cache_id.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let Some(entries) = entries.upgrade() else {
                    return;
                };
                if entries.lock().unwrap().remove(&cache_id).is_some() {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        cache_id = %cache_id,
                        "Cache entry expired"
                    );
                }
            })
            .abort_handle()
        };

        tracing::trace!(
            target: TRACING_TARGET,
            cache_id = %cache_id,
            parallel_key = %parallel_key,
            ttl_ms = ttl.as_millis(),
            "Cache entry written"
        );

        entries.insert(
            cache_id.to_owned(),
            CacheEntry {
                parallel_results,
                current_parallel_key: parallel_key.to_owned(),
                written_at: Timestamp::now(),
                expiry,
            },
        );
    }

    /// Returns a snapshot of the live entry, without resetting its expiry.
    pub fn get(&self, cache_id: &str) -> Option<CacheSnapshot> {
        if cache_id.is_empty() {
            return None;
        }
        let entries = self.entries.lock().unwrap();
        entries.get(cache_id).map(|entry| CacheSnapshot {
            parallel_results: entry.parallel_results.clone(),
            current_parallel_key: entry.current_parallel_key.clone(),
            written_at: entry.written_at,
        })
    }

    /// Removes one entry and cancels its timer.
    pub fn clear(&self, cache_id: &str) {
        if let Some(entry) = self.entries.lock().unwrap().remove(cache_id) {
            entry.expiry.abort();
        }
    }

    /// Removes every entry and cancels all timers.
    pub fn clear_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        for (_, entry) in entries.drain() {
            entry.expiry.abort();
        }
    }

    /// Returns how many identities currently have a live entry.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl std::fmt::Debug for SlidingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(nothing: bool) -> SerializedState {
        SerializedState {
            nothing,
            ..SerializedState::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiration_counts_from_last_write() {
        let cache = SlidingCache::new();
        let ttl = Duration::from_millis(1_000);

        cache.update("feed", state(false), ttl, "default");
        tokio::time::advance(Duration::from_millis(600)).await;

        // Second write slides the window: alive until t0 + 600 + 1000.
        cache.update("feed", state(true), ttl, "default");
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get("feed").is_some(), "entry outlived the first write's window");

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cache.get("feed").is_none(), "entry expired a full ttl after the last write");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_does_not_reset_expiry() {
        let cache = SlidingCache::new();
        let ttl = Duration::from_millis(1_000);

        cache.update("feed", state(false), ttl, "default");
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get("feed").is_some());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get("feed").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_sub_entries_accumulate() {
        let cache = SlidingCache::new();
        let ttl = Duration::from_millis(1_000);

        cache.update("feed", state(false), ttl, "1");
        cache.update("feed", state(true), ttl, "2");

        let snapshot = cache.get("feed").unwrap();
        assert_eq!(snapshot.parallel_results.len(), 2);
        assert_eq!(snapshot.current_parallel_key, "2");
        assert!(!snapshot.parallel_results["1"].nothing);
        assert!(snapshot.parallel_results["2"].nothing);

        // Expiry drops all sub-entries together.
        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert!(cache.get("feed").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_identity_is_never_persisted() {
        let cache = SlidingCache::new();
        cache.update("", state(false), Duration::from_millis(1_000), "default");
        assert!(cache.is_empty());
        assert!(cache.get("").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_timer() {
        let cache = SlidingCache::new();
        cache.update("feed", state(false), Duration::from_millis(1_000), "default");
        cache.clear("feed");
        assert!(cache.get("feed").is_none());

        // A fresh entry under the same identity must not be hit by the
        // cancelled timer.
        cache.update("feed", state(false), Duration::from_millis(10_000), "default");
        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert!(cache.get("feed").is_some());
    }

    #[tokio::test]
    async fn test_global_is_shared() {
        let a = SlidingCache::global();
        a.update("shared-entry", state(false), Duration::from_secs(60), "default");
        assert!(SlidingCache::global().get("shared-entry").is_some());
        a.clear("shared-entry");
    }
}
