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

//! Memoized aggregates and completion checks.

use super::{file_info_in, load_file, load_package, FileManager};
use crate::cache::invalidation::occupied_key;
use crate::core::error::Result;
use crate::core::types::{DownloadStats, FileId, FileInfo, QueueStats, UserId};
use crate::events::Event;
use tracing::{debug, info};

impl FileManager {
    /// Next job per owner given the plugins that are busy, memoized per plugin set
    pub fn get_jobs(&self, occupied: &[String]) -> Result<Vec<(UserId, FileInfo)>> {
        let mut state = self.state.write();
        let key = occupied_key(occupied);

        let jobs = match state.derived.jobs.get(&key) {
            Some(jobs) => jobs,
            None => {
                let jobs = self.store.jobs(occupied)?;
                state.derived.jobs.insert(key, jobs.clone());
                jobs
            }
        };

        let mut resolved = Vec::with_capacity(jobs.len());
        for (owner, fid) in jobs {
            if let Some(info) = file_info_in(self.store.as_ref(), &state.entities, fid)? {
                resolved.push((owner, info));
            }
        }
        Ok(resolved)
    }

    pub fn get_download_stats(&self, user: Option<UserId>) -> Result<DownloadStats> {
        let mut state = self.state.write();
        if let Some(stats) = state.derived.download_stats.get(&user) {
            return Ok(stats);
        }
        let stats = self.store.download_stats(user)?;
        state.derived.download_stats.insert(user, stats);
        Ok(stats)
    }

    /// Files still waiting for a worker. Failed files are not counted.
    pub fn get_queue_stats(&self, user: Option<UserId>, force: bool) -> Result<QueueStats> {
        let mut state = self.state.write();
        if !force {
            if let Some(stats) = state.derived.queue_stats.get(&user) {
                return Ok(stats);
            }
        }
        let stats = self.store.queue_stats(user)?;
        state.derived.queue_stats.insert(user, stats);
        Ok(stats)
    }

    /// Dispatch "all finished" if nothing is queued anywhere
    pub fn check_all_links_finished(&self) -> Result<bool> {
        if self.store.queue_stats(None)?.files > 0 {
            return Ok(false);
        }
        debug!("All downloads finished");
        self.events.dispatch(Event::AllFinished);
        Ok(true)
    }

    /// Dispatch "all processed" if nothing but `exclude` is left to process
    pub fn check_all_links_processed(&self, exclude: Option<FileId>) -> Result<bool> {
        self.state.write().derived.queue_stats.clear();

        if self.store.process_count(exclude, None)? > 0 {
            return Ok(false);
        }
        debug!("All downloads processed");
        self.events.dispatch(Event::AllProcessed);
        Ok(true)
    }

    /// Latch and announce a package once its last file is done.
    ///
    /// `fid` is the file being completed and may still count as unfinished.
    pub fn check_package_finished(&self, fid: FileId) -> Result<bool> {
        let finished = {
            let mut state = self.state.write();
            let Some(file) = load_file(self.store.as_ref(), &mut state.entities, fid)? else {
                return Ok(false);
            };
            let pid = file.package;

            let unfinished = self.store.unfinished(pid)?;
            let done = unfinished.is_empty() || (unfinished.len() == 1 && unfinished[0] == fid);
            if !done {
                return Ok(false);
            }

            match load_package(self.store.as_ref(), &mut state.entities, pid)? {
                Some(pack) if !pack.finished => {
                    pack.finished = true;
                    info!("Package finished: {}", pack.name);
                    Some(pack.to_info())
                }
                _ => None,
            }
        };

        match finished {
            Some(package) => {
                self.events.dispatch(Event::PackageFinished { package });
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
