//! Time-bounded cache for discovery results
//!
//! Insertion-ordered LRU with a TTL: entries expire after a fixed duration
//! and the oldest insertion is evicted when the cache is full. Used to
//! avoid re-validating unchanged plugin candidates between scans.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    order: u64,
}

/// An insertion-ordered LRU cache with per-entry TTL
#[derive(Debug)]
pub struct TimedLruCache<K, V> {
    capacity: usize,
    ttl: Duration,
    map: HashMap<K, Entry<V>>,
    insert_counter: u64,
    evictions: u64,
    expirations: u64,
}

impl<K, V> TimedLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache with the given capacity and entry TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            map: HashMap::with_capacity(capacity),
            insert_counter: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Get a value, removing it first if its TTL has elapsed
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.map.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.map.remove(key);
            self.expirations += 1;
            return None;
        }
        self.map.get(key).map(|entry| entry.value.clone())
    }

    /// Insert a value, evicting the oldest insertion at capacity
    pub fn put(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict_oldest();
        }
        self.insert_counter += 1;
        self.map
            .insert(key, Entry { value, inserted_at: Instant::now(), order: self.insert_counter });
    }

    /// Remove a key, returning its value if present
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key matches the predicate
    pub fn remove_matching(&mut self, mut predicate: impl FnMut(&K) -> bool) {
        self.map.retain(|key, _| !predicate(key));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clear all items from the cache
    pub fn clear(&mut self) {
        self.map.clear();
        self.insert_counter = 0;
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            size: self.map.len(),
            insertions: self.insert_counter,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.order)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
            self.evictions += 1;
        }
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub size: usize,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
}
