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

//! Cache module for LinkVault - resident entities and LRU memos of derived results.

pub mod entity_cache;
pub mod invalidation;
pub mod memory_cache;

pub use entity_cache::{CacheOverlay, EntityCache, NoOverlay};
pub use invalidation::{DerivedCaches, DerivedStats};
pub use memory_cache::{MemoCache, MemoStats};

use crate::core::config::CacheConfig;
use std::fmt;

/// Everything the file manager guards with its single lock
pub struct CacheState {
    pub entities: EntityCache,
    pub derived: DerivedCaches,
}

impl CacheState {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entities: EntityCache::new(),
            derived: DerivedCaches::new(config),
        }
    }

    /// Snapshot for diagnostics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            files: self.entities.file_count(),
            packages: self.entities.package_count(),
            derived: self.derived.stats(),
        }
    }
}

impl Default for CacheState {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub files: usize,
    pub packages: usize,
    pub derived: DerivedStats,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.derived.jobs.hits + self.derived.download_stats.hits + self.derived.queue_stats.hits;
        let misses =
            self.derived.jobs.misses + self.derived.download_stats.misses + self.derived.queue_stats.misses;
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} package(s), memo hit rate {:.0}%, {} invalidation(s)",
            self.files,
            self.packages,
            self.hit_rate() * 100.0,
            self.derived.generation
        )?;
        if self.derived.last_invalidation > 0 {
            write!(f, ", last at {} ms", self.derived.last_invalidation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::QueueStats;

    #[test]
    fn test_stats_display() {
        let mut state = CacheState::default();
        assert_eq!(
            state.stats().to_string(),
            "0 file(s), 0 package(s), memo hit rate 0%, 0 invalidation(s)"
        );

        state.derived.queue_stats.insert(None, QueueStats::default());
        state.derived.queue_stats.get(&None);
        state.derived.queue_stats.get(&Some(1));
        let stats = state.stats();
        assert_eq!(stats.hit_rate(), 0.5);

        state.derived.invalidate_all();
        let stats = state.stats();
        assert!(stats.derived.last_invalidation > 0);
        assert!(stats.to_string().contains("1 invalidation(s), last at "));
    }
}
