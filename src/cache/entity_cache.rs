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

//! Live file and package entities, keyed by id.
//!
//! While an entity is resident its fields are authoritative; the store row
//! may lag behind until the next save.

use crate::core::entity::{File, Package};
use crate::core::types::{FileId, FileInfo, PackageId, PackageInfo, PackageRef};
use std::collections::HashMap;

/// Source of entity state that shadows store snapshots
pub trait CacheOverlay {
    fn file(&self, fid: FileId) -> Option<FileInfo>;
    fn package(&self, pid: PackageId) -> Option<PackageInfo>;
}

/// An overlay that shadows nothing
pub struct NoOverlay;

impl CacheOverlay for NoOverlay {
    fn file(&self, _fid: FileId) -> Option<FileInfo> {
        None
    }

    fn package(&self, _pid: PackageId) -> Option<PackageInfo> {
        None
    }
}

/// Resident entities
#[derive(Debug, Default)]
pub struct EntityCache {
    files: HashMap<FileId, File>,
    packages: HashMap<PackageId, Package>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, fid: FileId) -> Option<&File> {
        self.files.get(&fid)
    }

    pub fn file_mut(&mut self, fid: FileId) -> Option<&mut File> {
        self.files.get_mut(&fid)
    }

    /// Insert unless already resident, returns the resident entity
    pub fn admit_file(&mut self, file: File) -> &mut File {
        self.files.entry(file.fid).or_insert(file)
    }

    pub fn remove_file(&mut self, fid: FileId) -> Option<File> {
        self.files.remove(&fid)
    }

    pub fn package(&self, pid: PackageId) -> Option<&Package> {
        self.packages.get(&pid)
    }

    pub fn package_mut(&mut self, pid: PackageId) -> Option<&mut Package> {
        self.packages.get_mut(&pid)
    }

    pub fn admit_package(&mut self, package: Package) -> &mut Package {
        self.packages.entry(package.pid).or_insert(package)
    }

    pub fn remove_package(&mut self, pid: PackageId) -> Option<Package> {
        self.packages.remove(&pid)
    }

    /// Evict every resident file of a package, returns their ids
    pub fn remove_files_of(&mut self, pid: PackageId) -> Vec<FileId> {
        let fids: Vec<FileId> = self.files_of(pid);
        for fid in &fids {
            self.files.remove(fid);
        }
        fids
    }

    /// Ids of resident files owned by `pid`
    pub fn files_of(&self, pid: PackageId) -> Vec<FileId> {
        self.files
            .values()
            .filter(|file| file.package == pid)
            .map(|file| file.fid)
            .collect()
    }

    /// Close the gap a departed file left among resident siblings
    pub fn compact_files(&mut self, pid: PackageId, removed_order: i64) {
        for file in self.files.values_mut() {
            if file.package == pid && file.order > removed_order {
                file.order -= 1;
            }
        }
    }

    /// Close the gap a departed package left among resident siblings
    pub fn compact_packages(&mut self, root: PackageRef, removed_order: i64) {
        for pack in self.packages.values_mut() {
            if pack.root == root && pack.order > removed_order {
                pack.order -= 1;
            }
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values()
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut File> {
        self.files.values_mut()
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.packages.values_mut()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}

impl CacheOverlay for EntityCache {
    fn file(&self, fid: FileId) -> Option<FileInfo> {
        self.files.get(&fid).map(File::to_info)
    }

    fn package(&self, pid: PackageId) -> Option<PackageInfo> {
        self.packages.get(&pid).map(Package::to_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DownloadStatus, PackageStatus};

    fn file(fid: FileId, package: PackageId, order: i64) -> File {
        File {
            fid,
            package,
            owner: 0,
            order,
            url: format!("http://host.example/{fid}"),
            name: format!("{fid}"),
            plugin: "BasePlugin".to_string(),
            size: 0,
            status: DownloadStatus::Queued,
            error: String::new(),
            hash: String::new(),
            added: 0,
        }
    }

    fn package(pid: PackageId, root: PackageRef, order: i64) -> Package {
        Package::from_info(PackageInfo {
            pid: PackageRef::Id(pid),
            name: format!("pack{pid}"),
            folder: String::new(),
            root,
            owner: 0,
            site: String::new(),
            comment: String::new(),
            password: String::new(),
            added: 0,
            status: PackageStatus::Ok,
            order,
            stats: None,
            pids: Vec::new(),
            fids: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_admit_keeps_resident_entity() {
        let mut cache = EntityCache::new();
        cache.admit_file(file(1, 1, 0)).name = "changed".to_string();
        let resident = cache.admit_file(file(1, 1, 0));
        assert_eq!(resident.name, "changed");
        assert_eq!(cache.file_count(), 1);
    }

    #[test]
    fn test_compact_only_touches_siblings() {
        let mut cache = EntityCache::new();
        cache.admit_file(file(1, 1, 0));
        cache.admit_file(file(2, 1, 2));
        cache.admit_file(file(3, 2, 2));
        cache.compact_files(1, 1);
        assert_eq!(cache.file(2).unwrap().order, 1);
        assert_eq!(cache.file(3).unwrap().order, 2);

        cache.admit_package(package(1, PackageRef::Root, 0));
        cache.admit_package(package(2, PackageRef::Root, 1));
        cache.compact_packages(PackageRef::Root, 0);
        assert_eq!(cache.package(2).unwrap().order, 0);
    }

    #[test]
    fn test_overlay_reflects_resident_state() {
        let mut cache = EntityCache::new();
        cache.admit_file(file(5, 1, 0)).status = DownloadStatus::Downloading;
        assert_eq!(CacheOverlay::file(&cache, 5).unwrap().status, DownloadStatus::Downloading);
        assert!(CacheOverlay::file(&cache, 6).is_none());
        assert!(NoOverlay.package(1).is_none());

        assert_eq!(cache.remove_files_of(1), vec![5]);
        assert_eq!(cache.file_count(), 0);
    }
}
