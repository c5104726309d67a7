use moka::future::Cache as MokaCache;
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

/// Configuration for in-memory response caching.
///
/// Only slow-changing metadata is cached (TAP table sets, catalog listings).
/// Query results are never cached; a repeated ADQL query hits the service
/// again.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of items to store
    pub max_capacity: u64,
    /// Time-to-live for cached items
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 64,
            time_to_live: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

/// In-memory cache backed by Moka
#[derive(Clone)]
pub struct MemoryCache<K, V> {
    cache: MokaCache<K, V>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            debug!("Cache hit");
        } else {
            debug!("Cache miss");
        }
        result
    }

    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value).await;
        debug!("Item cached");
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Cache cleared");
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}
