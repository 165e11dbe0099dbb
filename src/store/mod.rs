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

//! Persistent store boundary for LinkVault.
//!
//! Every call is synchronous and atomic. Lookups signal "not found" through
//! `None` or an empty collection, never through an error.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::core::error::Result;
use crate::core::types::{
    DownloadState, DownloadStats, DownloadStatus, FileId, FileInfo, LinkInfoUpdate, NewLink,
    NewPackage, PackageId, PackageInfo, PackageRef, PackageStats, QueueStats, UserId,
};
use std::collections::HashMap;

/// Filters for file listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    /// Only files owned by this package
    pub package: Option<PackageRef>,
    pub state: Option<DownloadState>,
    /// Substring of the file name
    pub search: Option<String>,
    pub owner: Option<UserId>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(mut self, package: PackageRef) -> Self {
        self.package = Some(package);
        self
    }

    pub fn state(mut self, state: Option<DownloadState>) -> Self {
        self.state = state;
        self
    }

    pub fn search(mut self, search: Option<&str>) -> Self {
        self.search = search.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    pub fn owner(mut self, owner: Option<UserId>) -> Self {
        self.owner = owner;
        self
    }
}

/// Commands and queries the file manager needs from its backing store
pub trait Store: Send + Sync {
    fn file_info(&self, fid: FileId) -> Result<Option<FileInfo>>;

    fn package_info(&self, pid: PackageId, with_stats: bool) -> Result<Option<PackageInfo>>;

    fn package_stats(&self, pid: PackageId) -> Result<PackageStats>;

    /// Packages with stats. `Some(Id(pid))` yields `pid` and its direct
    /// children, `Some(Root)` the top level, `None` everything.
    fn all_packages(
        &self,
        root: Option<PackageRef>,
        owner: Option<UserId>,
    ) -> Result<HashMap<PackageId, PackageInfo>>;

    fn all_files(&self, filter: &FileFilter) -> Result<HashMap<FileId, FileInfo>>;

    fn count_packages(&self, root: PackageRef) -> Result<u64>;

    fn count_files(&self, pid: PackageId) -> Result<u64>;

    /// Append links to the end of a package
    fn add_links(&self, links: &[NewLink], pid: PackageId, owner: UserId) -> Result<Vec<FileId>>;

    /// Append a package to the end of its parent
    fn add_package(&self, package: &NewPackage) -> Result<PackageId>;

    fn update_file(&self, file: &FileInfo) -> Result<()>;

    fn update_package(&self, package: &PackageInfo) -> Result<()>;

    /// Apply online check results by url, returns the number of touched files
    fn update_link_info(&self, updates: &[LinkInfoUpdate]) -> Result<usize>;

    fn set_download_status(&self, fid: FileId, status: DownloadStatus) -> Result<()>;

    /// Delete a file and close the gap it leaves
    fn delete_file(&self, fid: FileId) -> Result<()>;

    /// Delete a package with its whole subtree, returns the deleted ids
    fn delete_package(&self, pid: PackageId) -> Result<Vec<PackageId>>;

    fn order_package(&self, pid: PackageId, root: PackageRef, old: i64, position: i64) -> Result<()>;

    /// Move a contiguous block starting at `start`, laid out in `fids` order
    fn order_files(&self, pid: PackageId, fids: &[FileId], start: i64, position: i64) -> Result<()>;

    /// Re-parent a package to the end of `dest`
    fn move_package(&self, pid: PackageId, from: PackageRef, order: i64, dest: PackageRef) -> Result<()>;

    /// Move files to the end of `dest` and renumber what stays in `from`
    fn move_files(&self, fids: &[FileId], from: PackageId, dest: PackageId) -> Result<()>;

    fn restart_file(&self, fid: FileId) -> Result<()>;

    fn restart_package(&self, pid: PackageId) -> Result<()>;

    fn restart_failed(&self) -> Result<usize>;

    fn queue_stats(&self, user: Option<UserId>) -> Result<QueueStats>;

    fn download_stats(&self, user: Option<UserId>) -> Result<DownloadStats>;

    /// Files still to be processed, ignoring `exclude`
    fn process_count(&self, exclude: Option<FileId>, user: Option<UserId>) -> Result<u64>;

    /// Up to three unfinished files of a package
    fn unfinished(&self, pid: PackageId) -> Result<Vec<FileId>>;

    /// Next file per owner that no occupied plugin blocks
    fn jobs(&self, occupied: &[String]) -> Result<Vec<(UserId, FileId)>>;

    fn commit(&self) -> Result<()>;
}
