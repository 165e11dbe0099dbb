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

//! Tree views merged from store snapshots and resident entities.

use super::FileManager;
use crate::cache::CacheOverlay;
use crate::core::entity::RootPackage;
use crate::core::error::Result;
use crate::core::types::{
    DownloadState, FileId, FileInfo, PackageId, PackageInfo, PackageRef, TreeCollection, UserId,
};
use crate::store::FileFilter;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

impl FileManager {
    /// Tree rooted at `pid`.
    ///
    /// Without `full` only `pid`, its direct children and its own files are
    /// fetched. With `full` the whole forest is fetched and, for a real
    /// package, pruned to the subtree below `pid`. Unknown packages give an
    /// empty view.
    pub fn get_tree(
        &self,
        pid: PackageRef,
        full: bool,
        state: Option<DownloadState>,
        owner: Option<UserId>,
        search: Option<&str>,
    ) -> Result<TreeCollection> {
        let guard = self.state.read();

        let scope = if full { None } else { Some(pid) };
        let packages = self.store.all_packages(scope, owner)?;

        let mut filter = FileFilter::new().state(state).search(search).owner(owner);
        if let Some(scope) = scope {
            filter = filter.package(scope);
        }
        let files = self.store.all_files(&filter)?;

        debug!(
            "Assembling tree for {} from {} package(s) and {} file(s)",
            pid,
            packages.len(),
            files.len()
        );
        Ok(assemble_tree(pid, full, packages, files, &guard.entities))
    }
}

/// Build a [`TreeCollection`] from store snapshots.
///
/// Resident entities replace their snapshots; packages keep the stats the
/// store computed. Child lists are ordered by sibling order.
pub fn assemble_tree(
    pid: PackageRef,
    full: bool,
    mut packages: HashMap<PackageId, PackageInfo>,
    mut files: HashMap<FileId, FileInfo>,
    overlay: &impl CacheOverlay,
) -> TreeCollection {
    for (fid, info) in files.iter_mut() {
        if let Some(cached) = overlay.file(*fid) {
            *info = cached;
        }
    }
    for (id, info) in packages.iter_mut() {
        if let Some(mut cached) = overlay.package(*id) {
            cached.stats = info.stats.take();
            *info = cached;
        }
    }

    let mut root = match pid {
        PackageRef::Root => RootPackage::new().to_info(),
        PackageRef::Id(id) if packages.contains_key(&id) => PackageInfo {
            pids: Vec::new(),
            fids: Vec::new(),
            ..packages[&id].clone()
        },
        PackageRef::Id(_) => return TreeCollection::empty(),
    };

    for info in packages.values_mut() {
        info.pids.clear();
        info.fids.clear();
    }

    let links: Vec<(PackageRef, PackageId, i64)> = packages
        .values()
        .filter_map(|info| info.pid.id().map(|id| (info.root, id, info.order)))
        .filter(|(parent, id, _)| *parent != PackageRef::Id(*id))
        .collect();
    let mut children: HashMap<PackageRef, Vec<(i64, PackageId)>> = HashMap::new();
    for (parent, id, order) in links {
        children.entry(parent).or_default().push((order, id));
    }

    let mut owned: HashMap<PackageId, Vec<(i64, FileId)>> = HashMap::new();
    for file in files.values() {
        owned.entry(file.package).or_default().push((file.order, file.fid));
    }

    for (parent, mut kids) in children {
        kids.sort();
        let ids = kids.into_iter().map(|(_, id)| id).collect();
        match parent {
            PackageRef::Root if pid.is_root() => root.pids = ids,
            PackageRef::Root => {}
            PackageRef::Id(parent) => {
                if let Some(info) = packages.get_mut(&parent) {
                    info.pids = ids;
                }
            }
        }
    }
    for (package, mut members) in owned {
        if let Some(info) = packages.get_mut(&package) {
            members.sort();
            info.fids = members.into_iter().map(|(_, fid)| fid).collect();
        }
    }

    if let PackageRef::Id(id) = pid {
        if full {
            let keep = reachable(id, &packages);
            packages.retain(|pid, _| keep.contains(pid));
            files.retain(|_, file| keep.contains(&file.package));
        }
        if let Some(info) = packages.remove(&id) {
            root = info;
        }
    }

    TreeCollection {
        root: Some(root),
        packages,
        files,
    }
}

/// Breadth-first walk along child lists
fn reachable(start: PackageId, packages: &HashMap<PackageId, PackageInfo>) -> HashSet<PackageId> {
    let mut keep = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(pid) = queue.pop_front() {
        if !keep.insert(pid) {
            continue;
        }
        if let Some(info) = packages.get(&pid) {
            queue.extend(info.pids.iter().copied());
        }
    }
    keep
}
