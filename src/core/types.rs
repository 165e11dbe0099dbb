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

//! Core domain types for LinkVault.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type FileId = i64;
pub type PackageId = i64;
pub type UserId = i64;

/// Raw id the virtual root uses wherever a plain integer is required
pub(crate) const ROOT_RAW_ID: i64 = -1;

/// Owner of the virtual root package
pub const ROOT_OWNER: UserId = -1;

/// Reference to a package slot in the hierarchy.
///
/// The virtual root has no persisted row. It only turns into a raw `-1` at the
/// serde, CLI and store boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(from = "i64", into = "i64")]
pub enum PackageRef {
    #[default]
    Root,
    Id(PackageId),
}

impl PackageRef {
    /// Interpret a raw id, negative values denote the root
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            PackageRef::Root
        } else {
            PackageRef::Id(raw)
        }
    }

    pub fn raw(self) -> i64 {
        match self {
            PackageRef::Root => ROOT_RAW_ID,
            PackageRef::Id(pid) => pid,
        }
    }

    pub fn id(self) -> Option<PackageId> {
        match self {
            PackageRef::Root => None,
            PackageRef::Id(pid) => Some(pid),
        }
    }

    pub fn is_root(self) -> bool {
        matches!(self, PackageRef::Root)
    }
}

impl From<i64> for PackageRef {
    fn from(raw: i64) -> Self {
        PackageRef::from_raw(raw)
    }
}

impl From<PackageRef> for i64 {
    fn from(pref: PackageRef) -> Self {
        pref.raw()
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageRef::Root => write!(f, "root"),
            PackageRef::Id(pid) => write!(f, "{}", pid),
        }
    }
}

/// Download status of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    NotAvailable,
    Offline,
    Online,
    Queued,
    Paused,
    Finished,
    Skipped,
    Failed,
    Starting,
    Waiting,
    Downloading,
    TempOffline,
    Aborted,
    NotPossible,
    Missing,
    FileMismatch,
    Occupied,
    Decrypting,
    Processing,
    Custom,
    Unknown,
}

impl DownloadStatus {
    pub const ALL: [DownloadStatus; 21] = [
        DownloadStatus::NotAvailable,
        DownloadStatus::Offline,
        DownloadStatus::Online,
        DownloadStatus::Queued,
        DownloadStatus::Paused,
        DownloadStatus::Finished,
        DownloadStatus::Skipped,
        DownloadStatus::Failed,
        DownloadStatus::Starting,
        DownloadStatus::Waiting,
        DownloadStatus::Downloading,
        DownloadStatus::TempOffline,
        DownloadStatus::Aborted,
        DownloadStatus::NotPossible,
        DownloadStatus::Missing,
        DownloadStatus::FileMismatch,
        DownloadStatus::Occupied,
        DownloadStatus::Decrypting,
        DownloadStatus::Processing,
        DownloadStatus::Custom,
        DownloadStatus::Unknown,
    ];

    /// Numeric code as persisted by the store
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .unwrap_or(DownloadStatus::Unknown)
    }

    /// States a link recheck never touches
    pub fn skips_recheck(self) -> bool {
        matches!(
            self,
            DownloadStatus::Missing | DownloadStatus::Finished | DownloadStatus::Skipped
        )
    }

    /// States the download workers still have to go through
    pub fn is_processable(self) -> bool {
        matches!(
            self,
            DownloadStatus::Online
                | DownloadStatus::Queued
                | DownloadStatus::Starting
                | DownloadStatus::Waiting
                | DownloadStatus::Downloading
        )
    }

    /// States a job can be picked from
    pub fn is_job_candidate(self) -> bool {
        matches!(
            self,
            DownloadStatus::Online | DownloadStatus::Queued | DownloadStatus::Occupied
        )
    }

    /// States an online check result may overwrite
    pub fn accepts_link_info(self) -> bool {
        matches!(
            self,
            DownloadStatus::NotAvailable
                | DownloadStatus::Offline
                | DownloadStatus::Online
                | DownloadStatus::Queued
                | DownloadStatus::Missing
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            DownloadStatus::NotAvailable => "none",
            DownloadStatus::Offline => "offline",
            DownloadStatus::Online => "online",
            DownloadStatus::Queued => "queued",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Finished => "finished",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Starting => "starting",
            DownloadStatus::Waiting => "waiting",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::TempOffline => "temp. offline",
            DownloadStatus::Aborted => "aborted",
            DownloadStatus::NotPossible => "not possible",
            DownloadStatus::Missing => "missing",
            DownloadStatus::FileMismatch => "file mismatch",
            DownloadStatus::Occupied => "occupied",
            DownloadStatus::Decrypting => "decrypting",
            DownloadStatus::Processing => "processing",
            DownloadStatus::Custom => "custom",
            DownloadStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse state filter applied to file listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    #[default]
    All,
    Finished,
    Unfinished,
    Failed,
    Unmanaged,
}

impl DownloadState {
    /// Statuses covered by this state
    pub fn statuses(self) -> Vec<DownloadStatus> {
        DownloadStatus::ALL
            .iter()
            .copied()
            .filter(|status| self.contains(*status))
            .collect()
    }

    pub fn contains(self, status: DownloadStatus) -> bool {
        let finished = matches!(status, DownloadStatus::Finished | DownloadStatus::Skipped);
        let failed = matches!(
            status,
            DownloadStatus::Failed
                | DownloadStatus::TempOffline
                | DownloadStatus::Aborted
                | DownloadStatus::NotPossible
                | DownloadStatus::FileMismatch
        );
        match self {
            DownloadState::All => true,
            DownloadState::Finished => finished,
            DownloadState::Unfinished => !finished,
            DownloadState::Failed => failed,
            DownloadState::Unmanaged => !finished && !failed,
        }
    }
}

/// Package status flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    #[default]
    Ok,
    Paused,
}

impl PackageStatus {
    pub fn code(self) -> i64 {
        match self {
            PackageStatus::Ok => 0,
            PackageStatus::Paused => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            PackageStatus::Paused
        } else {
            PackageStatus::Ok
        }
    }
}

/// Aggregate counts of a package, computed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageStats {
    pub links_total: u64,
    pub links_done: u64,
    pub size_total: u64,
    pub size_done: u64,
}

/// Snapshot of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub fid: FileId,
    pub name: String,
    pub package: PackageId,
    pub owner: UserId,
    pub size: u64,
    pub status: DownloadStatus,
    pub error: String,
    pub plugin: String,
    pub url: String,
    pub hash: String,
    pub added: i64,
    pub order: i64,
}

/// Snapshot of a package, optionally with stats and direct children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub pid: PackageRef,
    pub name: String,
    pub folder: String,
    pub root: PackageRef,
    pub owner: UserId,
    pub site: String,
    pub comment: String,
    pub password: String,
    pub added: i64,
    pub status: PackageStatus,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PackageStats>,
    #[serde(default)]
    pub pids: Vec<PackageId>,
    #[serde(default)]
    pub fids: Vec<FileId>,
}

/// Number and size of files still waiting for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub files: u64,
    pub bytes: u64,
}

/// Finished versus total downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    pub done_files: u64,
    pub done_bytes: u64,
    pub total_files: u64,
    pub total_bytes: u64,
}

impl DownloadStats {
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.done_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Assembled view of a subtree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeCollection {
    /// `None` when the requested package does not exist
    pub root: Option<PackageInfo>,
    pub packages: HashMap<PackageId, PackageInfo>,
    pub files: HashMap<FileId, FileInfo>,
}

impl TreeCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

/// Input for creating a package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub folder: String,
    pub root: PackageRef,
    pub password: String,
    pub site: String,
    pub comment: String,
    pub paused: bool,
    pub owner: UserId,
}

impl NewPackage {
    pub fn new(name: impl Into<String>, root: PackageRef, owner: UserId) -> Self {
        let name = name.into();
        Self {
            folder: name.clone(),
            name,
            root,
            owner,
            ..Self::default()
        }
    }
}

/// A url with the plugin responsible for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLink {
    pub url: String,
    pub plugin: String,
}

impl NewLink {
    pub fn new(url: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self { url: url.into(), plugin: plugin.into() }
    }

    /// Name shown until a plugin resolves the real one
    pub fn display_name(&self) -> String {
        link_display_name(&self.url)
    }
}

/// Last path segment of a url, or the url itself when it has none
pub fn link_display_name(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| link.to_string())
}

/// Online check result for a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfoUpdate {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub status: DownloadStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ref_raw_roundtrip() {
        assert_eq!(PackageRef::from_raw(-1), PackageRef::Root);
        assert_eq!(PackageRef::from_raw(12), PackageRef::Id(12));
        assert_eq!(PackageRef::Root.raw(), -1);
        assert_eq!(PackageRef::Id(3).id(), Some(3));
        assert_eq!(serde_json::to_string(&PackageRef::Root).unwrap(), "-1");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DownloadStatus::Queued.code(), 3);
        assert_eq!(DownloadStatus::Unknown.code(), 20);
        assert_eq!(DownloadStatus::from_code(5), DownloadStatus::Finished);
        assert_eq!(DownloadStatus::from_code(99), DownloadStatus::Unknown);
        assert_eq!(DownloadStatus::TempOffline.to_string(), "temp. offline");
    }

    #[test]
    fn test_state_sets() {
        assert_eq!(
            DownloadState::Finished.statuses(),
            vec![DownloadStatus::Finished, DownloadStatus::Skipped]
        );
        assert!(DownloadState::Unfinished.contains(DownloadStatus::Failed));
        assert!(!DownloadState::Unmanaged.contains(DownloadStatus::Failed));
        assert!(DownloadState::Unmanaged.contains(DownloadStatus::Queued));
        assert_eq!(DownloadState::All.statuses().len(), 21);
    }

    #[test]
    fn test_link_display_name() {
        assert_eq!(link_display_name("http://host.example/dir/file.zip"), "file.zip");
        assert_eq!(link_display_name("http://host.example/"), "http://host.example/");
        assert_eq!(link_display_name("not a url"), "not a url");
    }

    #[test]
    fn test_download_stats_percent() {
        let stats = DownloadStats { done_files: 1, done_bytes: 0, total_files: 4, total_bytes: 0 };
        assert_eq!(stats.percent(), 25.0);
        assert_eq!(DownloadStats::default().percent(), 0.0);
    }
}
