//! Caching utilities for ryt-cipher

use crate::error::CipherError;
use crate::platform::cipher::{CipherConfig, Metrics, Transform};
use crate::platform::script_store::Script;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// In-memory cache with a fixed TTL per entry.
///
/// Expired entries read as absent but stay in the map until [`TtlCache::sweep`]
/// removes them.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Default time to live for inserted entries
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.lock();
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Number of physically stored entries, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The caches shared by one resolution engine
#[derive(Clone)]
pub struct CipherCaches {
    /// Raw scripts by URL (10 minutes)
    pub scripts: Arc<TtlCache<String, Script>>,
    /// Parsed transforms by script content hash (1 hour)
    pub transforms: Arc<TtlCache<String, Transform>>,
    /// Resolved signatures by raw signature (1 hour)
    pub signatures: Arc<TtlCache<String, String>>,
    /// Decoded throttle values by raw value (1 hour)
    pub throttle: Arc<TtlCache<String, String>>,
}

impl CipherCaches {
    pub fn new(config: &CipherConfig) -> Self {
        Self {
            scripts: Arc::new(TtlCache::new(config.script_ttl)),
            transforms: Arc::new(TtlCache::new(config.transform_ttl)),
            signatures: Arc::new(TtlCache::new(config.signature_ttl)),
            throttle: Arc::new(TtlCache::new(config.throttle_ttl)),
        }
    }

    /// Shortest TTL across all caches
    pub fn min_ttl(&self) -> Duration {
        [
            self.scripts.ttl(),
            self.transforms.ttl(),
            self.signatures.ttl(),
            self.throttle.ttl(),
        ]
        .into_iter()
        .min()
        .unwrap_or(Duration::ZERO)
    }

    /// Sweep all caches once, returning the number of evicted entries
    pub fn sweep_all(&self) -> usize {
        self.scripts.sweep()
            + self.transforms.sweep()
            + self.signatures.sweep()
            + self.throttle.sweep()
    }

    /// Start the periodic background sweep.
    ///
    /// `interval` must be strictly shorter than every cache TTL. The task stops
    /// when the returned handle is dropped.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<SweeperHandle, CipherError> {
        if interval.is_zero() || interval >= self.min_ttl() {
            return Err(CipherError::InvalidConfig(format!(
                "sweep interval {:?} must be non-zero and shorter than the smallest cache TTL {:?}",
                interval,
                self.min_ttl()
            )));
        }

        let caches = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = caches.sweep_all();
                debug!(evicted, "cache sweep finished");
                if let Some(metrics) = &metrics {
                    let snapshot = metrics.snapshot();
                    info!(
                        requests = snapshot.requests,
                        cache_hits = snapshot.cache_hits,
                        cache_misses = snapshot.cache_misses,
                        hit_ratio = snapshot.hit_ratio(),
                        avg_latency_ms = snapshot.average_latency().as_secs_f64() * 1000.0,
                        "cipher metrics"
                    );
                }
            }
        });

        Ok(SweeperHandle { task })
    }

    /// Clear all caches
    pub fn clear_all(&self) {
        self.scripts.clear();
        self.transforms.clear();
        self.signatures.clear();
        self.throttle.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            script_entries: self.scripts.len(),
            transform_entries: self.transforms.len(),
            signature_entries: self.signatures.len(),
            throttle_entries: self.throttle.len(),
        }
    }
}

/// Owns the background sweep task and aborts it on drop
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub script_entries: usize,
    pub transform_entries: usize,
    pub signature_entries: usize,
    pub throttle_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ttl_cache() {
        let cache = TtlCache::new(Duration::from_secs(10));

        cache.insert("key1", "value1");
        assert_eq!(cache.get(&"key1"), Some("value1"));
        assert_eq!(cache.get(&"missing"), None);

        cache.insert("key1", "value2");
        assert_eq!(cache.get(&"key1"), Some("value2"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_reads_absent_until_swept() {
        let cache = TtlCache::new(Duration::from_secs(10));

        cache.insert_with_ttl("short", "value", Duration::from_millis(50));
        cache.insert("long", "value");
        assert_eq!(cache.get(&"short"), Some("value"));

        thread::sleep(Duration::from_millis(80));

        // Reads treat the entry as gone but it is still stored
        assert_eq!(cache.get(&"short"), None);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"long"), Some("value"));
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert(1u32, "a".to_string());
        cache.insert(2u32, "b".to_string());
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_caches_use_configured_ttls() {
        let config = CipherConfig::default();
        let caches = CipherCaches::new(&config);
        assert_eq!(caches.scripts.ttl(), Duration::from_secs(600));
        assert_eq!(caches.signatures.ttl(), Duration::from_secs(3600));
        assert_eq!(caches.min_ttl(), Duration::from_secs(600));
        assert!(config.sweep_interval < caches.min_ttl());
    }

    #[test]
    fn test_stats_and_clear_all() {
        let caches = CipherCaches::new(&CipherConfig::default());
        caches.signatures.insert("sig".into(), "out".into());
        caches.throttle.insert("n".into(), "m".into());

        let stats = caches.stats();
        assert_eq!(stats.signature_entries, 1);
        assert_eq!(stats.throttle_entries, 1);
        assert_eq!(stats.script_entries, 0);

        caches.clear_all();
        assert_eq!(caches.stats().signature_entries, 0);
    }

    #[tokio::test]
    async fn test_sweeper_rejects_interval_not_shorter_than_ttl() {
        let caches = CipherCaches::new(&CipherConfig::default());
        assert!(caches.spawn_sweeper(Duration::from_secs(600), None).is_err());
        assert!(caches.spawn_sweeper(Duration::ZERO, None).is_err());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let config = CipherConfig::default()
            .with_signature_ttl(Duration::from_millis(200))
            .with_sweep_interval(Duration::from_millis(20));
        let caches = CipherCaches::new(&config);
        caches
            .signatures
            .insert_with_ttl("sig".into(), "out".into(), Duration::from_millis(30));

        let handle = caches
            .spawn_sweeper(Duration::from_millis(20), None)
            .unwrap();
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(caches.signatures.len(), 0);
    }
}
