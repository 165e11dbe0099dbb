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

//! File manager: the cache-and-consistency engine in front of the store.
//!
//! All cache state sits behind one [`RwLock`]. Every public method takes the
//! lock exactly once and works on the guarded [`CacheState`] through the
//! lock-free helpers below, so nothing ever re-acquires it. Events collected
//! during a mutation are dispatched after the guard is released.

mod aggregate;
mod lifecycle;
mod ordering;
pub mod tree;

pub use tree::assemble_tree;

use crate::cache::{CacheState, CacheStats, EntityCache};
use crate::core::config::CacheConfig;
use crate::core::entity::{File, Package, PackageHandle, RootPackage};
use crate::core::error::{QueueError, Result};
use crate::core::types::{FileId, FileInfo, PackageId, PackageInfo, PackageRef};
use crate::events::{Event, EventSink};
use crate::store::{FileFilter, Store};
use crate::worker::WorkerPool;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Cache-and-consistency engine over a [`Store`]
pub struct FileManager {
    store: Arc<dyn Store>,
    events: Arc<dyn EventSink>,
    workers: Arc<dyn WorkerPool>,
    state: RwLock<CacheState>,
}

impl FileManager {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventSink>,
        workers: Arc<dyn WorkerPool>,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            store,
            events,
            workers,
            state: RwLock::new(CacheState::new(cache)),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Commit pending store writes
    pub fn save(&self) -> Result<()> {
        self.store.commit()
    }

    /// Write every cached entity back to the store, then commit
    pub fn sync_save(&self) -> Result<()> {
        let state = self.state.read();
        for file in state.entities.files() {
            self.store.update_file(&file.to_info())?;
        }
        for pack in state.entities.packages() {
            self.store.update_package(&pack.to_info())?;
        }
        self.store.commit()?;
        debug!(
            "Synced {} file(s) and {} package(s)",
            state.entities.file_count(),
            state.entities.package_count()
        );
        Ok(())
    }

    /// Cached file, loading it from the store on a miss
    pub fn get_file(&self, fid: FileId) -> Result<Option<File>> {
        let mut state = self.state.write();
        Ok(load_file(self.store.as_ref(), &mut state.entities, fid)?.cloned())
    }

    /// Cached package, loading it on a miss. The root is synthesized on every call.
    pub fn get_package(&self, pid: PackageRef) -> Result<Option<PackageHandle>> {
        let PackageRef::Id(id) = pid else {
            return Ok(Some(PackageHandle::Root(RootPackage::new())));
        };

        let mut state = self.state.write();
        let pack = load_package(self.store.as_ref(), &mut state.entities, id)?.map(|pack| {
            pack.touch();
            pack.clone()
        });
        Ok(pack.map(PackageHandle::Package))
    }

    /// File snapshot, preferring the cached copy. Does not populate the cache.
    pub fn get_file_info(&self, fid: FileId) -> Result<Option<FileInfo>> {
        let state = self.state.read();
        file_info_in(self.store.as_ref(), &state.entities, fid)
    }

    /// Package snapshot with stats and direct children
    pub fn get_package_info(&self, pid: PackageRef) -> Result<Option<PackageInfo>> {
        let state = self.state.read();

        let info = match pid {
            PackageRef::Root => Some(RootPackage::new().to_info()),
            PackageRef::Id(id) => match state.entities.package(id) {
                Some(pack) => {
                    let mut info = pack.to_info();
                    info.stats = Some(self.store.package_stats(id)?);
                    Some(info)
                }
                None => self.store.package_info(id, true)?,
            },
        };
        let Some(mut info) = info else {
            return Ok(None);
        };

        let mut children: Vec<PackageInfo> = self
            .store
            .all_packages(Some(pid), None)?
            .into_values()
            .filter(|child| child.pid != pid)
            .collect();
        children.sort_by_key(|child| child.order);
        info.pids = children.into_iter().filter_map(|child| child.pid.id()).collect();

        if let PackageRef::Id(id) = pid {
            let mut files: Vec<FileInfo> = self
                .store
                .all_files(&FileFilter::new().package(PackageRef::Id(id)))?
                .into_values()
                .collect();
            files.sort_by_key(|file| file.order);
            info.fids = files.into_iter().map(|file| file.fid).collect();
        }

        Ok(Some(info))
    }

    /// Evict a file without touching the store
    pub fn release_file(&self, fid: FileId) {
        if self.state.write().entities.remove_file(fid).is_some() {
            trace!("Released file {}", fid);
        }
    }

    /// Evict a package without touching the store
    pub fn release_package(&self, pid: PackageId) {
        if self.state.write().entities.remove_package(pid).is_some() {
            trace!("Released package {}", pid);
        }
    }

    pub fn cached_files(&self) -> Vec<File> {
        self.state.read().entities.files().cloned().collect()
    }

    pub fn cached_packages(&self) -> Vec<Package> {
        self.state.read().entities.packages().cloned().collect()
    }

    /// Edit a file in place. Visible through every view at once, persisted
    /// by [`FileManager::update_file`] or [`FileManager::sync_save`].
    pub fn modify_file<R>(&self, fid: FileId, edit: impl FnOnce(&mut File) -> R) -> Result<Option<R>> {
        self.mutate(|state, _| {
            Ok(load_file(self.store.as_ref(), &mut state.entities, fid)?.map(edit))
        })
    }

    /// Edit a package in place, see [`FileManager::modify_file`]
    pub fn modify_package<R>(
        &self,
        pid: PackageId,
        edit: impl FnOnce(&mut Package) -> R,
    ) -> Result<Option<R>> {
        self.mutate(|state, _| {
            Ok(load_package(self.store.as_ref(), &mut state.entities, pid)?.map(|pack| {
                pack.touch();
                edit(pack)
            }))
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.read().stats()
    }

    /// Run a mutation under the exclusive lock.
    ///
    /// Derived caches are dropped before `op` runs. Events pushed by `op` go
    /// out after the lock is released, and only if `op` succeeded.
    fn mutate<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut CacheState, &mut Vec<Event>) -> Result<T>,
    {
        let mut events = Vec::new();
        let value = {
            let mut state = self.state.write();
            state.derived.invalidate_all();
            op(&mut *state, &mut events)?
        };
        self.dispatch_all(events);
        Ok(value)
    }

    fn dispatch_all(&self, events: Vec<Event>) {
        for event in events {
            trace!("Dispatching {}", event);
            self.events.dispatch(event);
        }
    }
}

/// Resident file, loaded from the store on a miss
fn load_file<'a>(store: &dyn Store, entities: &'a mut EntityCache, fid: FileId) -> Result<Option<&'a mut File>> {
    if entities.file(fid).is_some() {
        return Ok(entities.file_mut(fid));
    }
    match store.file_info(fid)? {
        Some(info) => {
            debug!("Cache miss for file {}", fid);
            Ok(Some(entities.admit_file(File::from_info(info))))
        }
        None => Ok(None),
    }
}

/// Resident package, loaded from the store on a miss
fn load_package<'a>(
    store: &dyn Store,
    entities: &'a mut EntityCache,
    pid: PackageId,
) -> Result<Option<&'a mut Package>> {
    if entities.package(pid).is_some() {
        return Ok(entities.package_mut(pid));
    }
    match store.package_info(pid, false)?.and_then(Package::from_info) {
        Some(pack) => {
            debug!("Cache miss for package {}", pid);
            Ok(Some(entities.admit_package(pack)))
        }
        None => Ok(None),
    }
}

fn file_info_in(store: &dyn Store, entities: &EntityCache, fid: FileId) -> Result<Option<FileInfo>> {
    match entities.file(fid) {
        Some(file) => Ok(Some(file.to_info())),
        None => store.file_info(fid),
    }
}

fn package_info_in(store: &dyn Store, entities: &EntityCache, pid: PackageId) -> Result<Option<PackageInfo>> {
    match entities.package(pid) {
        Some(pack) => Ok(Some(pack.to_info())),
        None => store.package_info(pid, false),
    }
}

/// Each file may appear once in a block
fn reject_duplicates(fids: &[FileId]) -> Result<()> {
    let mut seen = HashSet::with_capacity(fids.len());
    match fids.iter().find(|fid| !seen.insert(**fid)) {
        Some(fid) => Err(QueueError::DuplicateFile(*fid).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::types::{NewLink, NewPackage};
    use crate::events::EventBus;
    use crate::store::SqliteStore;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tokio::sync::broadcast;

    /// Worker pool that records every call
    #[derive(Default)]
    pub struct RecordingWorkers {
        pub processing: Mutex<HashSet<FileId>>,
        pub aborted: Mutex<Vec<FileId>>,
        pub info_threads: Mutex<Vec<(Vec<(String, String)>, PackageId)>>,
    }

    impl WorkerPool for RecordingWorkers {
        fn abort_download(&self, fid: FileId) {
            self.aborted.lock().push(fid);
        }

        fn is_processing(&self, fid: FileId) -> bool {
            self.processing.lock().contains(&fid)
        }

        fn create_info_thread(&self, urls: Vec<(String, String)>, pid: PackageId) {
            self.info_threads.lock().push((urls, pid));
        }
    }

    pub struct Harness {
        pub manager: FileManager,
        pub store: Arc<SqliteStore>,
        pub workers: Arc<RecordingWorkers>,
        pub events: broadcast::Receiver<Event>,
    }

    impl Harness {
        pub fn new() -> Self {
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let workers = Arc::new(RecordingWorkers::default());
            let bus = Arc::new(EventBus::new());
            let events = bus.subscribe();
            let manager = FileManager::new(store.clone(), bus, workers.clone(), &CacheConfig::default());
            Self { manager, store, workers, events }
        }

        pub fn package(&self, name: &str, root: PackageRef) -> PackageId {
            self.manager.add_package(&NewPackage::new(name, root, 0)).unwrap()
        }

        pub fn links(&self, pid: PackageId, count: usize) -> Vec<FileId> {
            let links: Vec<NewLink> = (0..count)
                .map(|i| NewLink::new(format!("http://host.example/{pid}/{i}.bin"), "BasePlugin"))
                .collect();
            self.manager.add_links(&links, pid, 0).unwrap()
        }

        pub fn events(&mut self) -> Vec<Event> {
            crate::events::drain(&mut self.events)
        }

        /// Cached orders of resident files, in fid order
        pub fn cached_orders(&self, fids: &[FileId]) -> Vec<i64> {
            fids.iter()
                .map(|fid| self.manager.get_file(*fid).unwrap().unwrap().order)
                .collect()
        }

        /// Store orders of every file in a package, sorted by order
        pub fn stored_orders(&self, pid: PackageId) -> Vec<(FileId, i64)> {
            let mut orders: Vec<_> = self
                .store
                .all_files(&FileFilter::new().package(PackageRef::Id(pid)))
                .unwrap()
                .into_values()
                .map(|f| (f.fid, f.order))
                .collect();
            orders.sort_by_key(|(_, order)| *order);
            orders
        }

        pub fn stored_package_orders(&self, root: PackageRef) -> Vec<(PackageId, i64)> {
            let mut orders: Vec<_> = self
                .store
                .all_packages(Some(root), None)
                .unwrap()
                .into_values()
                .filter(|p| p.root == root)
                .filter_map(|p| p.pid.id().map(|pid| (pid, p.order)))
                .collect();
            orders.sort_by_key(|(_, order)| *order);
            orders
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;
    use crate::core::types::{DownloadStatus, NewLink, NewPackage, PackageStatus};
    use crate::events::Event;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_root_package_is_synthesized() {
        let h = Harness::new();
        let root = h.manager.get_package(PackageRef::Root).unwrap().unwrap();
        assert_eq!(root.pid(), PackageRef::Root);
        assert!(h.manager.cached_packages().is_empty());
    }

    #[test]
    fn test_get_file_populates_cache() {
        let h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let fids = h.links(pid, 1);

        assert!(h.manager.cached_files().is_empty());
        let file = h.manager.get_file(fids[0]).unwrap().unwrap();
        assert_eq!(file.package, pid);
        assert_eq!(h.manager.cached_files().len(), 1);
        assert!(h.manager.get_file(9999).unwrap().is_none());

        h.manager.release_file(fids[0]);
        assert!(h.manager.cached_files().is_empty());
    }

    #[test]
    fn test_add_package_then_info() {
        let h = Harness::new();
        h.package("first", PackageRef::Root);
        let pid = h
            .manager
            .add_package(&NewPackage {
                password: "secret".to_string(),
                paused: true,
                ..NewPackage::new("second", PackageRef::Root, 0)
            })
            .unwrap();

        let info = h.manager.get_package_info(PackageRef::Id(pid)).unwrap().unwrap();
        assert_eq!(info.name, "second");
        assert_eq!(info.folder, "second");
        assert_eq!(info.password, "secret");
        assert_eq!(info.status, PackageStatus::Paused);
        assert_eq!(info.root, PackageRef::Root);
        assert_eq!(info.order, 1);
        assert!(info.stats.is_some());
    }

    #[test]
    fn test_package_info_lists_children_in_order() {
        let h = Harness::new();
        let parent = h.package("parent", PackageRef::Root);
        let a = h.package("a", PackageRef::Id(parent));
        let b = h.package("b", PackageRef::Id(parent));
        let fids = h.links(parent, 2);

        let info = h.manager.get_package_info(PackageRef::Id(parent)).unwrap().unwrap();
        assert_eq!(info.pids, vec![a, b]);
        assert_eq!(info.fids, fids);
        assert_eq!(info.stats.unwrap().links_total, 2);

        let root = h.manager.get_package_info(PackageRef::Root).unwrap().unwrap();
        assert_eq!(root.pids, vec![parent]);
    }

    #[test]
    fn test_modify_file_is_visible_before_save() {
        let h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let fid = h.links(pid, 1)[0];

        h.manager
            .modify_file(fid, |file| file.status = DownloadStatus::Downloading)
            .unwrap()
            .unwrap();

        let info = h.manager.get_file_info(fid).unwrap().unwrap();
        assert_eq!(info.status, DownloadStatus::Downloading);
        assert_eq!(h.store.file_info(fid).unwrap().unwrap().status, DownloadStatus::Queued);

        h.manager.sync_save().unwrap();
        assert_eq!(h.store.file_info(fid).unwrap().unwrap().status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_concurrent_callers_keep_orders_dense() {
        use crate::events::EventBus;
        use crate::store::SqliteStore;
        use crate::worker::IdleWorkers;
        use std::thread;

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let manager = Arc::new(FileManager::new(
            store.clone(),
            Arc::new(EventBus::new()),
            Arc::new(IdleWorkers),
            &CacheConfig::default(),
        ));
        let pid = manager.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let links: Vec<NewLink> = (0..24)
            .map(|i| NewLink::new(format!("http://host.example/{i}.bin"), "BasePlugin"))
            .collect();
        let fids = manager.add_links(&links, pid, 0).unwrap();
        for fid in &fids {
            manager.get_file(*fid).unwrap();
        }

        let reorder = {
            let (manager, fids) = (manager.clone(), fids.clone());
            thread::spawn(move || {
                for round in 0..60_usize {
                    let fid = fids[round % 12];
                    // rejected moves are fine, the file may be gone already
                    let _ = manager.order_files(&[fid], pid, (round % 7) as i64);
                }
            })
        };
        let remove = {
            let (manager, fids) = (manager.clone(), fids.clone());
            thread::spawn(move || {
                for fid in fids.iter().skip(6).step_by(3) {
                    manager.remove_file(*fid).unwrap();
                }
            })
        };
        let read = {
            let manager = manager.clone();
            thread::spawn(move || {
                for _ in 0..40 {
                    let tree = manager.get_tree(PackageRef::Id(pid), false, None, None, None).unwrap();
                    assert!(tree.root.is_some());
                }
            })
        };
        for handle in [reorder, remove, read] {
            handle.join().unwrap();
        }

        let stored = store.all_files(&FileFilter::new().package(PackageRef::Id(pid))).unwrap();
        let mut orders: Vec<i64> = stored.values().map(|file| file.order).collect();
        orders.sort();
        assert_eq!(orders, (0..stored.len() as i64).collect::<Vec<_>>());

        for file in manager.cached_files() {
            assert_eq!(file.order, stored[&file.fid].order, "file {}", file.fid);
        }
        assert_eq!(manager.cached_files().len(), stored.len());
    }

    #[test]
    fn test_failed_mutation_dispatches_nothing() {
        let mut h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        h.events();

        assert!(h.manager.order_package(pid, 5).is_err());
        assert!(h.events().is_empty());

        h.manager.order_package(pid, 0).unwrap();
        assert_eq!(
            h.events(),
            vec![Event::PackageReordered { pid, position: 0, root: PackageRef::Root }]
        );
    }
}
