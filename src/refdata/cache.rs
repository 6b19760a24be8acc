//! Short-TTL cache fronting the reference-data store. Single-writer in
//! effect: a miss populates the cache, a write is last-writer-wins, and
//! staleness up to the configured TTL is acceptable since the relational
//! store remains ground truth. Grounded on the pack's `DashMap`-backed cache
//! patterns (fraud.rs's `velocity_cache`, Ferrous-DNS's `DashMap`-backed
//! cache storage).

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        None
    }

    pub fn put(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry { value, expires_at: Instant::now() + ttl },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_expires() {
        let cache: TtlCache<String, i32> = TtlCache::new();
        cache.put("k".to_string(), 1, Duration::from_millis(20));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"k".to_string()), None);
    }
}
