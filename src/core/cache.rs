use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    // Insertion order for eviction; keys stay here after removal and are
    // skipped when popped.
    order: VecDeque<K>,
}

/// Expiring key/value cache with lazy per-read expiry and insertion-order
/// eviction once `max_size` is exceeded. No background sweeper.
#[derive(Clone)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    max_size: usize,
    inner: Arc<Mutex<CacheInner<K, V>>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            })),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            inner.map.remove(key);
            return None;
        }
        inner.map.get(key).map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        let mut inner = self.inner.lock().await;
        let fresh = inner
            .map
            .insert(key.clone(), CacheEntry { value, expires_at })
            .is_none();
        // Re-set keys keep their original insertion position.
        if fresh {
            inner.order.push_back(key);
        }

        let mut evicted = 0usize;
        while inner.map.len() > self.max_size {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.map.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            warn!(evicted, "cache evicted entries due to size limit");
        }
    }

    pub async fn remove(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.map.remove(key);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.map.clear();
        inner.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }
}

impl<K, V> std::fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .finish()
    }
}
