//! Short-lived in-memory result cache.
//!
//! Entries expire lazily on read once their TTL has elapsed, and the least
//! recently used entry is evicted once the cache is at capacity. Concurrent
//! misses on the same key each recompute; the last insert wins.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Entries kept per cache when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 256;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

pub struct TtlCache<K: Hash + Eq, V> {
    entries: RwLock<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
    capacity: NonZeroUsize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CAPACITY)
    }

    /// A capacity of 0 is raised to 1.
    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            ttl,
            capacity,
        }
    }

    /// Return the cached value for `key` if it is younger than the TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                debug!("Cache hit for {:?}", key);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Cache entry for {:?} expired", key);
            entries.pop(key);
        }
        None
    }

    pub async fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                debug!("Cache full, evicted {:?}", evicted);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.insert("madurai".to_string(), 42).await;

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get(&"madurai".to_string()).await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_after_ttl_evicts_entry() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.insert("madurai".to_string(), 42).await;

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.get(&"madurai".to_string()).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_key_misses() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"pune".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("pune".to_string(), 1).await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_oldest_key_evicted_at_capacity() {
        let cache = TtlCache::with_capacity(Duration::from_secs(600), 2);
        cache.insert("madurai".to_string(), 1).await;
        cache.insert("pune".to_string(), 2).await;
        cache.insert("nagpur".to_string(), 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"madurai".to_string()).await, None);
        assert_eq!(cache.get(&"pune".to_string()).await, Some(2));
        assert_eq!(cache.get(&"nagpur".to_string()).await, Some(3));
    }

    #[tokio::test]
    async fn test_recent_read_protects_key_from_eviction() {
        let cache = TtlCache::with_capacity(Duration::from_secs(600), 2);
        cache.insert("madurai".to_string(), 1).await;
        cache.insert("pune".to_string(), 2).await;
        assert_eq!(cache.get(&"madurai".to_string()).await, Some(1));

        cache.insert("nagpur".to_string(), 3).await;
        assert_eq!(cache.get(&"madurai".to_string()).await, Some(1));
        assert_eq!(cache.get(&"pune".to_string()).await, None);
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache: TtlCache<String, i32> = TtlCache::with_capacity(Duration::from_secs(60), 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_insert_replaces_value() {
        tokio_test::block_on(async {
            let cache = TtlCache::new(Duration::from_secs(60));
            cache.insert(1u8, "old").await;
            cache.insert(1u8, "new").await;
            assert_eq!(cache.get(&1u8).await, Some("new"));
            assert_eq!(cache.len().await, 1);
        });
    }
}
