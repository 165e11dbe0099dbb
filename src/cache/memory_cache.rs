// LinkVault - In-memory index and consistency layer for download queues
// Copyright (C) 2025 LinkVault contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Bounded LRU memo for derived results.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// LRU memo keyed by query arguments
pub struct MemoCache<K: Hash + Eq, V: Clone> {
    cache: LruCache<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> MemoCache<K, V> {
    /// Create a memo holding at most `capacity` results
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a memoized result (requires mutable self for LRU update)
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(value.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.cache.put(key, value);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.pop(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    /// Drop every entry, keeping the counters
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get memo statistics
    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.cache.len(),
            capacity: self.cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Memo statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl MemoStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut memo: MemoCache<Option<i64>, u64> = MemoCache::new(4);
        memo.insert(Some(1), 10);
        assert_eq!(memo.get(&Some(1)), Some(10));
        assert_eq!(memo.get(&None), None);
    }

    #[test]
    fn test_lru_eviction() {
        let mut memo = MemoCache::new(2);
        memo.insert("a", 1);
        memo.insert("b", 2);
        memo.insert("c", 3); // evicts "a"

        assert!(!memo.contains(&"a"));
        assert!(memo.contains(&"b"));
        assert!(memo.contains(&"c"));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut memo = MemoCache::new(0);
        memo.insert(1, "x");
        assert_eq!(memo.stats().capacity, 1);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_stats() {
        let mut memo = MemoCache::new(8);
        memo.insert(1, 1);
        let _ = memo.get(&1); // Hit
        let _ = memo.get(&2); // Miss

        let stats = memo.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);

        memo.clear();
        assert!(memo.is_empty());
    }
}
