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

//! Live entities held by the entity cache.

use crate::core::types::{
    DownloadStatus, FileId, FileInfo, PackageId, PackageInfo, PackageRef, PackageStatus,
    UserId, ROOT_OWNER,
};
use std::time::Instant;

/// A cached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub fid: FileId,
    pub package: PackageId,
    pub owner: UserId,
    pub order: i64,
    pub url: String,
    pub name: String,
    pub plugin: String,
    pub size: u64,
    pub status: DownloadStatus,
    pub error: String,
    pub hash: String,
    pub added: i64,
}

impl File {
    pub fn from_info(info: FileInfo) -> Self {
        Self {
            fid: info.fid,
            package: info.package,
            owner: info.owner,
            order: info.order,
            url: info.url,
            name: info.name,
            plugin: info.plugin,
            size: info.size,
            status: info.status,
            error: info.error,
            hash: info.hash,
            added: info.added,
        }
    }

    pub fn to_info(&self) -> FileInfo {
        FileInfo {
            fid: self.fid,
            name: self.name.clone(),
            package: self.package,
            owner: self.owner,
            size: self.size,
            status: self.status,
            error: self.error.clone(),
            plugin: self.plugin.clone(),
            url: self.url.clone(),
            hash: self.hash.clone(),
            added: self.added,
            order: self.order,
        }
    }

    /// Take over the columns the store persists on update. Placement stays.
    pub fn merge_persisted(&mut self, other: &File) {
        self.name = other.name.clone();
        self.size = other.size;
        self.status = other.status;
        self.error = other.error.clone();
        self.hash = other.hash.clone();
    }

    /// Put the file back into the queue, forgetting what a plugin resolved
    pub fn reset(&mut self) {
        self.status = DownloadStatus::Queued;
        self.name = self.url.clone();
        self.error.clear();
    }
}

/// A cached package
#[derive(Debug, Clone)]
pub struct Package {
    pub pid: PackageId,
    pub root: PackageRef,
    pub owner: UserId,
    pub order: i64,
    pub name: String,
    pub folder: String,
    pub site: String,
    pub comment: String,
    pub password: String,
    pub added: i64,
    pub status: PackageStatus,
    /// Latched once the "package finished" notification went out
    pub finished: bool,
    pub last_access: Instant,
}

impl Package {
    /// Build from a store snapshot, `None` if the snapshot is the virtual root
    pub fn from_info(info: PackageInfo) -> Option<Self> {
        let pid = info.pid.id()?;
        Some(Self {
            pid,
            root: info.root,
            owner: info.owner,
            order: info.order,
            name: info.name,
            folder: info.folder,
            site: info.site,
            comment: info.comment,
            password: info.password,
            added: info.added,
            status: info.status,
            finished: false,
            last_access: Instant::now(),
        })
    }

    /// View without stats or children
    pub fn to_info(&self) -> PackageInfo {
        PackageInfo {
            pid: PackageRef::Id(self.pid),
            name: self.name.clone(),
            folder: self.folder.clone(),
            root: self.root,
            owner: self.owner,
            site: self.site.clone(),
            comment: self.comment.clone(),
            password: self.password.clone(),
            added: self.added,
            status: self.status,
            order: self.order,
            stats: None,
            pids: Vec::new(),
            fids: Vec::new(),
        }
    }

    /// Take over the columns the store persists on update. Placement and
    /// the finished latch stay.
    pub fn merge_persisted(&mut self, other: &Package) {
        self.name = other.name.clone();
        self.folder = other.folder.clone();
        self.site = other.site.clone();
        self.comment = other.comment.clone();
        self.password = other.password.clone();
        self.status = other.status;
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    pub fn is_paused(&self) -> bool {
        self.status == PackageStatus::Paused
    }
}

/// The virtual top of every owner's forest. Never persisted, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootPackage {
    pub owner: UserId,
}

impl RootPackage {
    pub fn new() -> Self {
        Self { owner: ROOT_OWNER }
    }

    pub fn to_info(&self) -> PackageInfo {
        PackageInfo {
            pid: PackageRef::Root,
            name: "root".to_string(),
            folder: String::new(),
            root: PackageRef::Root,
            owner: self.owner,
            site: String::new(),
            comment: String::new(),
            password: String::new(),
            added: 0,
            status: PackageStatus::Ok,
            order: 0,
            stats: None,
            pids: Vec::new(),
            fids: Vec::new(),
        }
    }
}

impl Default for RootPackage {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a package lookup
#[derive(Debug, Clone)]
pub enum PackageHandle {
    Root(RootPackage),
    Package(Package),
}

impl PackageHandle {
    pub fn pid(&self) -> PackageRef {
        match self {
            PackageHandle::Root(_) => PackageRef::Root,
            PackageHandle::Package(pack) => PackageRef::Id(pack.pid),
        }
    }

    pub fn to_info(&self) -> PackageInfo {
        match self {
            PackageHandle::Root(root) => root.to_info(),
            PackageHandle::Package(pack) => pack.to_info(),
        }
    }
}
