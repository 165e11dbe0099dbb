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

//! Boundary to the download worker pool.

use crate::core::types::{FileId, PackageId};
use tracing::{debug, info};

/// Operations the file manager needs from whatever runs transfers
pub trait WorkerPool: Send + Sync {
    /// Stop an active transfer, no-op if none is running
    fn abort_download(&self, fid: FileId);

    fn is_processing(&self, fid: FileId) -> bool;

    /// Start an online check for `(url, plugin)` pairs. Fire and forget.
    fn create_info_thread(&self, urls: Vec<(String, String)>, pid: PackageId);
}

/// Pool without running transfers, used by the command line front end
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleWorkers;

impl WorkerPool for IdleWorkers {
    fn abort_download(&self, fid: FileId) {
        debug!("No transfer running for file {}", fid);
    }

    fn is_processing(&self, _fid: FileId) -> bool {
        false
    }

    fn create_info_thread(&self, urls: Vec<(String, String)>, pid: PackageId) {
        info!("Queued online check of {} link(s) in package {}", urls.len(), pid);
        for (url, plugin) in &urls {
            debug!("  {} via {}", url, plugin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_workers_never_process() {
        let pool = IdleWorkers;
        assert!(!pool.is_processing(1));
        pool.abort_download(1);
        pool.create_info_thread(vec![("http://host.example/a".into(), "BasePlugin".into())], 1);
    }
}
