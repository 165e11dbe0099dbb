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

//! Sibling order maintenance.
//!
//! Orders inside a sibling set are always exactly `0..n`. Both operations
//! validate everything up front, then patch the store and the resident
//! siblings inside the same critical section.

use super::{file_info_in, package_info_in, reject_duplicates, FileManager};
use crate::core::error::{QueueError, Result};
use crate::core::types::{FileId, FileInfo, PackageId};
use crate::events::Event;
use crate::package_missing;
use tracing::{info, warn};

impl FileManager {
    /// Move a package to `position` among its siblings
    pub fn order_package(&self, pid: PackageId, position: i64) -> Result<()> {
        self.mutate(|state, events| {
            let info = package_info_in(self.store.as_ref(), &state.entities, pid)?
                .ok_or_else(|| package_missing!(pid))?;
            let (root, old) = (info.root, info.order);

            let siblings = self.store.count_packages(root)?;
            if position < 0 || position as u64 >= siblings {
                warn!("Rejected reorder of package {} to {}", pid, position);
                return Err(QueueError::PositionOutOfRange { position, len: siblings as usize }.into());
            }

            self.store.order_package(pid, root, old, position)?;

            for pack in state.entities.packages_mut() {
                if pack.root != root || pack.order < 0 {
                    continue;
                }
                if pack.pid == pid {
                    pack.order = position;
                } else if position < old && (position..old).contains(&pack.order) {
                    pack.order += 1;
                } else if old < position && pack.order > old && pack.order <= position {
                    pack.order -= 1;
                }
            }

            self.store.commit()?;
            info!("Moved package {} from {} to {}", pid, old, position);
            events.push(Event::PackageReordered { pid, position, root });
            Ok(())
        })
    }

    /// Move a contiguous block of files to `position` inside `pid`.
    ///
    /// The block is laid out in the order `fids` are given.
    pub fn order_files(&self, fids: &[FileId], pid: PackageId, position: i64) -> Result<()> {
        self.mutate(|state, events| {
            if fids.is_empty() {
                return Err(QueueError::EmptyBlock.into());
            }
            reject_duplicates(fids)?;

            let mut block: Vec<FileInfo> = Vec::with_capacity(fids.len());
            for fid in fids {
                let file = file_info_in(self.store.as_ref(), &state.entities, *fid)?
                    .ok_or(QueueError::FileDoesNotExist(*fid))?;
                if file.package != pid {
                    return Err(QueueError::MixedPackages.into());
                }
                block.push(file);
            }

            let len = block.len() as i64;
            let min = block.iter().map(|f| f.order).min().unwrap_or_default();
            let max = block.iter().map(|f| f.order).max().unwrap_or_default();
            if min + len != max + 1 {
                warn!("Rejected reorder of non contiguous block in package {}", pid);
                return Err(QueueError::NonContiguousBlock { min, max, len: block.len() }.into());
            }

            let siblings = self.store.count_files(pid)?;
            if position < 0 || position as u64 >= siblings {
                return Err(QueueError::PositionOutOfRange { position, len: siblings as usize }.into());
            }
            let start = min;
            if start < position && position < start + len - 1 {
                return Err(QueueError::InvalidOperation(format!(
                    "position {} lies inside the block {}..={}",
                    position, start, max
                ))
                .into());
            }

            self.store.order_files(pid, fids, start, position)?;

            if start > position {
                for file in state.entities.files_mut() {
                    if file.package == pid && file.order >= 0 && (position..start).contains(&file.order) {
                        file.order += len;
                    }
                }
                for (i, fid) in (0_i64..).zip(fids) {
                    if let Some(file) = state.entities.file_mut(*fid) {
                        file.order = position + i;
                    }
                }
            } else if start < position {
                for file in state.entities.files_mut() {
                    if file.package == pid && file.order >= start + len && file.order <= position {
                        file.order -= len;
                    }
                }
                for (i, fid) in (0_i64..).zip(fids) {
                    if let Some(file) = state.entities.file_mut(*fid) {
                        file.order = position - len + i + 1;
                    }
                }
            }

            self.store.commit()?;
            info!("Moved {} file(s) in package {} from {} to {}", len, pid, start, position);
            events.push(Event::FileReordered { pid });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::core::error::{LinkVaultError, QueueError};
    use crate::core::types::PackageRef;
    use crate::events::Event;
    use crate::manager::testing::Harness;
    use pretty_assertions::assert_eq;

    fn assert_dense(orders: &[(i64, i64)]) {
        let mut values: Vec<i64> = orders.iter().map(|(_, order)| *order).collect();
        values.sort();
        assert_eq!(values, (0..orders.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_move_block_later() {
        let mut h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let f = h.links(pid, 4);
        h.cached_orders(&f);
        h.events();

        h.manager.order_files(&[f[1], f[2]], pid, 3).unwrap();

        assert_eq!(h.cached_orders(&f), vec![0, 2, 3, 1]);
        assert_eq!(h.stored_orders(pid), vec![(f[0], 0), (f[3], 1), (f[1], 2), (f[2], 3)]);
        assert_eq!(h.events(), vec![Event::FileReordered { pid }]);
    }

    #[test]
    fn test_move_block_earlier() {
        let h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let f = h.links(pid, 5);
        h.cached_orders(&f);

        h.manager.order_files(&[f[3], f[4]], pid, 1).unwrap();

        assert_eq!(h.cached_orders(&f), vec![0, 3, 4, 1, 2]);
        assert_eq!(
            h.stored_orders(pid),
            vec![(f[0], 0), (f[3], 1), (f[4], 2), (f[1], 3), (f[2], 4)]
        );
    }

    #[test]
    fn test_non_contiguous_block_is_rejected() {
        let mut h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let f = h.links(pid, 4);
        h.cached_orders(&f);
        h.events();

        let err = h.manager.order_files(&[f[0], f[2], f[3]], pid, 1).unwrap_err();
        assert!(matches!(
            err,
            LinkVaultError::Queue(QueueError::NonContiguousBlock { min: 0, max: 3, len: 3 })
        ));
        assert_eq!(h.cached_orders(&f), vec![0, 1, 2, 3]);
        assert_eq!(h.stored_orders(pid), vec![(f[0], 0), (f[1], 1), (f[2], 2), (f[3], 3)]);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_repeated_file_in_block_is_rejected() {
        let mut h = Harness::new();
        let pid = h.package("A", PackageRef::Root);
        let f = h.links(pid, 5);
        h.cached_orders(&f);
        h.events();

        let err = h.manager.order_files(&[f[1], f[1], f[3]], pid, 0).unwrap_err();
        assert!(matches!(err, LinkVaultError::Queue(QueueError::DuplicateFile(fid)) if fid == f[1]));
        assert_eq!(h.cached_orders(&f), vec![0, 1, 2, 3, 4]);
        assert_dense(&h.stored_orders(pid));
        assert_eq!(h.stored_orders(pid)[0], (f[0], 0));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_block_validation() {
        let h = Harness::new();
        let a = h.package("A", PackageRef::Root);
        let b = h.package("B", PackageRef::Root);
        let fa = h.links(a, 3);
        let fb = h.links(b, 1);

        let rejected = |result: crate::core::error::Result<()>| match result {
            Err(LinkVaultError::Queue(err)) => err,
            other => panic!("expected queue error, got {:?}", other),
        };
        assert_eq!(rejected(h.manager.order_files(&[], a, 0)), QueueError::EmptyBlock);
        assert_eq!(rejected(h.manager.order_files(&[fa[0], fb[0]], a, 0)), QueueError::MixedPackages);
        assert_eq!(rejected(h.manager.order_files(&[404], a, 0)), QueueError::FileDoesNotExist(404));
        assert_eq!(
            rejected(h.manager.order_files(&[fa[0]], a, 3)),
            QueueError::PositionOutOfRange { position: 3, len: 3 }
        );
        assert!(matches!(
            rejected(h.manager.order_files(&[fa[0], fa[1], fa[2]], a, 1)),
            QueueError::InvalidOperation(_)
        ));
    }

    #[test]
    fn test_order_package_both_directions() {
        let h = Harness::new();
        let p: Vec<_> = (0..4).map(|i| h.package(&format!("p{i}"), PackageRef::Root)).collect();
        for pid in &p {
            h.manager.get_package(PackageRef::Id(*pid)).unwrap();
        }

        h.manager.order_package(p[0], 2).unwrap();
        assert_eq!(
            h.stored_package_orders(PackageRef::Root),
            vec![(p[1], 0), (p[2], 1), (p[0], 2), (p[3], 3)]
        );

        h.manager.order_package(p[3], 0).unwrap();
        let expected = vec![(p[3], 0), (p[1], 1), (p[2], 2), (p[0], 3)];
        assert_eq!(h.stored_package_orders(PackageRef::Root), expected);

        let mut cached: Vec<_> = h.manager.cached_packages().iter().map(|p| (p.pid, p.order)).collect();
        cached.sort_by_key(|(_, order)| *order);
        assert_eq!(cached, expected);
        assert_dense(&cached);
    }

    #[test]
    fn test_order_package_same_position_changes_nothing() {
        let h = Harness::new();
        let p: Vec<_> = (0..3).map(|i| h.package(&format!("p{i}"), PackageRef::Root)).collect();
        for pid in &p {
            h.manager.get_package(PackageRef::Id(*pid)).unwrap();
        }

        h.manager.order_package(p[1], 1).unwrap();
        assert_eq!(h.stored_package_orders(PackageRef::Root), vec![(p[0], 0), (p[1], 1), (p[2], 2)]);
        let mut cached: Vec<_> = h.manager.cached_packages().iter().map(|p| (p.pid, p.order)).collect();
        cached.sort();
        assert_eq!(cached, vec![(p[0], 0), (p[1], 1), (p[2], 2)]);
    }

    #[test]
    fn test_order_unknown_package() {
        let h = Harness::new();
        assert!(matches!(
            h.manager.order_package(77, 0),
            Err(LinkVaultError::Queue(QueueError::PackageDoesNotExist(PackageRef::Id(77))))
        ));
    }

    #[test]
    fn test_nested_siblings_are_independent() {
        let h = Harness::new();
        let parent = h.package("parent", PackageRef::Root);
        let other = h.package("other", PackageRef::Root);
        let a = h.package("a", PackageRef::Id(parent));
        let b = h.package("b", PackageRef::Id(parent));

        h.manager.order_package(b, 0).unwrap();
        assert_eq!(h.stored_package_orders(PackageRef::Id(parent)), vec![(b, 0), (a, 1)]);
        assert_eq!(h.stored_package_orders(PackageRef::Root), vec![(parent, 0), (other, 1)]);
    }
}
