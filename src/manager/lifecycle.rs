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

//! Insert, delete, update, restart and move operations.

use super::{file_info_in, package_info_in, reject_duplicates, FileManager};
use crate::cache::EntityCache;
use crate::core::entity::{File, Package};
use crate::core::error::{QueueError, Result};
use crate::core::types::{
    DownloadState, DownloadStatus, FileId, FileInfo, LinkInfoUpdate, NewLink, NewPackage,
    PackageId, PackageRef, UserId,
};
use crate::events::Event;
use crate::package_missing;
use crate::store::{FileFilter, Store};
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl FileManager {
    /// Append links to a package
    pub fn add_links(&self, links: &[NewLink], pid: PackageId, owner: UserId) -> Result<Vec<FileId>> {
        self.mutate(|state, events| {
            if package_info_in(self.store.as_ref(), &state.entities, pid)?.is_none() {
                return Err(package_missing!(pid));
            }
            let fids = self.store.add_links(links, pid, owner)?;
            info!("Added {} link(s) to package {}", fids.len(), pid);
            events.push(Event::PackageUpdated { pid });
            Ok(fids)
        })
    }

    /// Append a new package to the end of its parent
    pub fn add_package(&self, package: &NewPackage) -> Result<PackageId> {
        self.mutate(|state, events| {
            if let PackageRef::Id(root) = package.root {
                if package_info_in(self.store.as_ref(), &state.entities, root)?.is_none() {
                    return Err(package_missing!(root));
                }
            }

            let pid = self.store.add_package(package)?;
            let info = self.store.package_info(pid, false)?.ok_or_else(|| package_missing!(pid))?;
            info!("Added package {} ({}) under {}", pid, info.name, info.root);
            events.push(Event::PackageInserted { pid, root: info.root, order: info.order });
            Ok(pid)
        })
    }

    /// Delete a package with everything below it. `false` if it did not exist.
    pub fn remove_package(&self, pid: PackageId) -> Result<bool> {
        self.mutate(|state, events| {
            let Some(info) = package_info_in(self.store.as_ref(), &state.entities, pid)? else {
                return Ok(false);
            };

            let subtree = collect_subtree(self.store.as_ref(), pid)?;
            for file in state.entities.files() {
                if subtree.contains(&file.package) {
                    self.workers.abort_download(file.fid);
                }
            }

            let deleted = self.store.delete_package(pid)?;
            for member in subtree.iter().chain(deleted.iter()) {
                state.entities.remove_package(*member);
                state.entities.remove_files_of(*member);
            }
            state.entities.compact_packages(info.root, info.order);

            info!("Removed package {} ({} package(s) in subtree)", pid, subtree.len());
            events.push(Event::PackageDeleted { pid });
            Ok(true)
        })
    }

    /// Delete a single file. `false` if it did not exist.
    pub fn remove_file(&self, fid: FileId) -> Result<bool> {
        self.mutate(|state, events| {
            let Some(info) = file_info_in(self.store.as_ref(), &state.entities, fid)? else {
                return Ok(false);
            };

            if self.workers.is_processing(fid) {
                self.workers.abort_download(fid);
            }

            self.store.delete_file(fid)?;
            state.entities.remove_file(fid);
            state.entities.compact_files(info.package, info.order);

            debug!("Removed file {} from package {}", fid, info.package);
            events.push(Event::FileDeleted { fid, pid: info.package });
            Ok(true)
        })
    }

    /// Persist the editable fields of a file and patch the resident copy.
    ///
    /// Order and package are owned by the ordering and move operations and
    /// are never taken from `file`.
    pub fn update_file(&self, file: &File) -> Result<()> {
        self.mutate(|state, events| {
            self.store.update_file(&file.to_info())?;
            if let Some(cached) = state.entities.file_mut(file.fid) {
                cached.merge_persisted(file);
            }
            events.push(Event::FileUpdated { fid: file.fid });
            Ok(())
        })
    }

    /// Persist the editable fields of a package and patch the resident copy
    pub fn update_package(&self, package: &Package) -> Result<()> {
        self.mutate(|state, events| {
            self.store.update_package(&package.to_info())?;
            if let Some(cached) = state.entities.package_mut(package.pid) {
                cached.merge_persisted(package);
            }
            events.push(Event::PackageUpdated { pid: package.pid });
            Ok(())
        })
    }

    /// Apply online check results, returns the number of touched files
    pub fn update_file_info(&self, updates: &[LinkInfoUpdate], pid: PackageId) -> Result<usize> {
        self.mutate(|state, events| {
            let touched = self.store.update_link_info(updates)?;
            for update in updates {
                for file in state.entities.files_mut() {
                    if file.url == update.url && file.status.accepts_link_info() {
                        file.name = update.name.clone();
                        file.size = update.size;
                        file.status = update.status;
                    }
                }
            }
            debug!("Link info updated {} file(s)", touched);
            events.push(Event::PackageUpdated { pid });
            Ok(touched)
        })
    }

    pub fn set_download_status(&self, fid: FileId, status: DownloadStatus) -> Result<()> {
        self.mutate(|state, events| {
            if let Some(file) = state.entities.file_mut(fid) {
                file.status = status;
            }
            self.store.set_download_status(fid, status)?;
            events.push(Event::FileUpdated { fid });
            Ok(())
        })
    }

    /// Queue a file again, aborting a running transfer. `false` if it did not exist.
    pub fn restart_file(&self, fid: FileId) -> Result<bool> {
        self.mutate(|state, events| {
            if file_info_in(self.store.as_ref(), &state.entities, fid)?.is_none() {
                return Ok(false);
            }
            if let Some(file) = state.entities.file_mut(fid) {
                file.reset();
                self.workers.abort_download(fid);
            }
            self.store.restart_file(fid)?;
            events.push(Event::FileUpdated { fid });
            Ok(true)
        })
    }

    /// Queue every file of a package again
    pub fn restart_package(&self, pid: PackageId) -> Result<()> {
        self.mutate(|state, events| {
            for file in state.entities.files_mut() {
                if file.package == pid {
                    file.reset();
                    self.workers.abort_download(file.fid);
                }
            }
            self.store.restart_package(pid)?;
            if let Some(pack) = state.entities.package_mut(pid) {
                pack.finished = false;
            }
            info!("Restarted package {}", pid);
            events.push(Event::PackageUpdated { pid });
            Ok(())
        })
    }

    /// Queue every failed file again, returns how many were restarted
    pub fn restart_failed(&self) -> Result<usize> {
        self.mutate(|state, _| {
            let restarted = self.store.restart_failed()?;
            for file in state.entities.files_mut() {
                if DownloadState::Failed.contains(file.status) {
                    file.status = DownloadStatus::Queued;
                    file.error.clear();
                }
            }
            Ok(restarted)
        })
    }

    /// Re-parent a package to the end of `dest`.
    ///
    /// `Ok(false)` when it already lives there.
    pub fn move_package(&self, pid: PackageId, dest: PackageRef) -> Result<bool> {
        self.mutate(|state, _| {
            let store = self.store.as_ref();
            let info = package_info_in(store, &state.entities, pid)?.ok_or_else(|| package_missing!(pid))?;
            if let PackageRef::Id(target) = dest {
                if package_info_in(store, &state.entities, target)?.is_none() {
                    return Err(package_missing!(dest));
                }
            }

            if is_within(store, &state.entities, dest, pid)? {
                warn!("Rejected move of package {} into its own subtree", pid);
                return Err(QueueError::CyclicMove { pid: PackageRef::Id(pid), dest }.into());
            }
            if info.root == dest {
                return Ok(false);
            }

            store.move_package(pid, info.root, info.order, dest)?;
            state.entities.remove_package(pid);
            state.entities.compact_packages(info.root, info.order);

            info!("Moved package {} from {} to {}", pid, info.root, dest);
            Ok(true)
        })
    }

    /// Move files to the end of `dest`.
    ///
    /// `Ok(false)` when they already live there.
    pub fn move_files(&self, fids: &[FileId], dest: PackageId) -> Result<bool> {
        self.mutate(|state, _| {
            let store = self.store.as_ref();
            let Some(first) = fids.first() else {
                return Err(QueueError::EmptyBlock.into());
            };
            reject_duplicates(fids)?;
            let first = file_info_in(store, &state.entities, *first)?.ok_or(QueueError::FileDoesNotExist(*first))?;
            let source = first.package;

            let mut moved: Vec<FileInfo> = Vec::with_capacity(fids.len());
            for fid in fids {
                let file = file_info_in(store, &state.entities, *fid)?.ok_or(QueueError::FileDoesNotExist(*fid))?;
                if file.package != source {
                    return Err(QueueError::MixedPackages.into());
                }
                moved.push(file);
            }

            if source == dest {
                return Ok(false);
            }
            if package_info_in(store, &state.entities, dest)?.is_none() {
                return Err(package_missing!(dest));
            }

            store.move_files(fids, source, dest)?;

            let departed: Vec<i64> = moved.iter().map(|file| file.order).collect();
            for file in &moved {
                state.entities.remove_file(file.fid);
            }
            for file in state.entities.files_mut() {
                if file.package == source {
                    let gaps = departed.iter().filter(|order| **order < file.order).count() as i64;
                    file.order -= gaps;
                }
            }

            info!("Moved {} file(s) from package {} to {}", fids.len(), source, dest);
            Ok(true)
        })
    }

    /// Hand every file of a package that still needs checking to the info worker
    pub fn recheck_package(&self, pid: PackageId) -> Result<usize> {
        let urls = self.mutate(|state, _| {
            if package_info_in(self.store.as_ref(), &state.entities, pid)?.is_none() {
                return Err(package_missing!(pid));
            }

            let mut files: Vec<FileInfo> = self
                .store
                .all_files(&FileFilter::new().package(PackageRef::Id(pid)))?
                .into_values()
                .map(|file| state.entities.file(file.fid).map(File::to_info).unwrap_or(file))
                .filter(|file| !file.status.skips_recheck())
                .collect();
            files.sort_by_key(|file| file.order);

            Ok(files
                .into_iter()
                .map(|file| (file.url, file.plugin))
                .collect::<Vec<_>>())
        })?;

        let count = urls.len();
        self.workers.create_info_thread(urls, pid);
        Ok(count)
    }
}

/// `pid` and every package below it
fn collect_subtree(store: &dyn Store, pid: PackageId) -> Result<HashSet<PackageId>> {
    let mut subtree = HashSet::from([pid]);
    let mut queue = vec![pid];
    while let Some(current) = queue.pop() {
        for child in store.all_packages(Some(PackageRef::Id(current)), None)?.into_values() {
            if child.root != PackageRef::Id(current) {
                continue;
            }
            if let Some(id) = child.pid.id() {
                if subtree.insert(id) {
                    queue.push(id);
                }
            }
        }
    }
    Ok(subtree)
}

/// Whether `node` is `ancestor` or lies below it
fn is_within(store: &dyn Store, entities: &EntityCache, node: PackageRef, ancestor: PackageId) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut current = node;
    while let PackageRef::Id(id) = current {
        if id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id) {
            break;
        }
        current = match package_info_in(store, entities, id)? {
            Some(info) => info.root,
            None => break,
        };
    }
    Ok(false)
}
