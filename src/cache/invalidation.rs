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

//! Derived-result memos and their invalidation.
//!
//! Job lists and both stats memos are dropped together by [`DerivedCaches::invalidate_all`].
//! Every mutating queue operation calls it before touching anything else.

use super::memory_cache::{MemoCache, MemoStats};
use crate::core::config::CacheConfig;
use crate::core::types::{DownloadStats, FileId, QueueStats, UserId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Occupied plugin names, normalized so equal sets share a memo slot
pub type OccupiedKey = BTreeSet<String>;

/// Memos over store aggregates
pub struct DerivedCaches {
    pub jobs: MemoCache<OccupiedKey, Vec<(UserId, FileId)>>,
    pub download_stats: MemoCache<Option<UserId>, DownloadStats>,
    pub queue_stats: MemoCache<Option<UserId>, QueueStats>,
    generation: AtomicU64,
    last_invalidation: AtomicU64,
}

impl DerivedCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            jobs: MemoCache::new(config.jobs_capacity),
            download_stats: MemoCache::new(config.stats_capacity),
            queue_stats: MemoCache::new(config.stats_capacity),
            generation: AtomicU64::new(0),
            last_invalidation: AtomicU64::new(0),
        }
    }

    /// Drop every memoized aggregate
    pub fn invalidate_all(&mut self) {
        self.jobs.clear();
        self.download_stats.clear();
        self.queue_stats.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.last_invalidation.store(current_epoch_ms(), Ordering::SeqCst);
        trace!("Derived caches invalidated");
    }

    /// Number of invalidations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Epoch milliseconds of the last invalidation, 0 if none happened
    pub fn last_invalidation(&self) -> u64 {
        self.last_invalidation.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DerivedStats {
        DerivedStats {
            jobs: self.jobs.stats(),
            download_stats: self.download_stats.stats(),
            queue_stats: self.queue_stats.stats(),
            generation: self.generation(),
            last_invalidation: self.last_invalidation(),
        }
    }
}

impl Default for DerivedCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Snapshot of the memo counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedStats {
    pub jobs: MemoStats,
    pub download_stats: MemoStats,
    pub queue_stats: MemoStats,
    pub generation: u64,
    /// Epoch milliseconds, 0 if nothing was invalidated yet
    pub last_invalidation: u64,
}

/// Normalize an occupied plugin list into a memo key
pub fn occupied_key(occupied: &[String]) -> OccupiedKey {
    occupied.iter().cloned().collect()
}

fn current_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_all_clears_every_memo() {
        let mut derived = DerivedCaches::default();
        derived.jobs.insert(occupied_key(&[]), vec![(0, 1)]);
        derived.download_stats.insert(None, DownloadStats::default());
        derived.queue_stats.insert(Some(3), QueueStats { files: 1, bytes: 2 });

        derived.invalidate_all();

        assert!(derived.jobs.is_empty());
        assert!(derived.download_stats.is_empty());
        assert!(derived.queue_stats.is_empty());
        assert_eq!(derived.generation(), 1);
        assert!(derived.last_invalidation() > 0);
    }

    #[test]
    fn test_occupied_key_ignores_order() {
        let a = occupied_key(&["B".to_string(), "A".to_string()]);
        let b = occupied_key(&["A".to_string(), "B".to_string(), "A".to_string()]);
        assert_eq!(a, b);
    }
}
