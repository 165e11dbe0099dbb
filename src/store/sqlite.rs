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

//! SQLite-backed persistent store for LinkVault.

use super::{FileFilter, Store};
use crate::core::config::Config;
use crate::core::error::{Result, StoreError};
use crate::core::types::{
    DownloadState, DownloadStats, DownloadStatus, FileId, FileInfo, LinkInfoUpdate, NewLink,
    NewPackage, PackageId, PackageInfo, PackageRef, PackageStats, PackageStatus, QueueStats,
    UserId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS packages (
        pid INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        folder TEXT NOT NULL DEFAULT '',
        root INTEGER NOT NULL DEFAULT -1,
        owner INTEGER NOT NULL,
        site TEXT NOT NULL DEFAULT '',
        comment TEXT NOT NULL DEFAULT '',
        password TEXT NOT NULL DEFAULT '',
        added INTEGER NOT NULL DEFAULT 0,
        status INTEGER NOT NULL DEFAULT 0,
        packageorder INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_packages_root ON packages(root, packageorder);

    CREATE TABLE IF NOT EXISTS files (
        fid INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        dlstatus INTEGER NOT NULL DEFAULT 3,
        error TEXT NOT NULL DEFAULT '',
        plugin TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,
        hash TEXT NOT NULL DEFAULT '',
        added INTEGER NOT NULL DEFAULT 0,
        fileorder INTEGER NOT NULL DEFAULT 0,
        package INTEGER NOT NULL,
        owner INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_files_package ON files(package, fileorder);
    CREATE INDEX IF NOT EXISTS idx_files_url ON files(url);
";

const FILE_COLUMNS: &str =
    "f.fid, f.name, f.size, f.dlstatus, f.error, f.plugin, f.url, f.hash, f.added, f.fileorder, f.package, f.owner";

const PACKAGE_COLUMNS: &str =
    "p.pid, p.name, p.folder, p.root, p.owner, p.site, p.comment, p.password, p.added, p.status, p.packageorder";

/// SQLite store holding packages and files
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open the store configured for this installation
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Self::open(&config.database_path())?;
        store
            .conn()?
            .busy_timeout(Duration::from_millis(config.store.busy_timeout_ms))
            .map_err(|e| StoreError::InitFailed(e.to_string()))?;
        Ok(store)
    }

    /// Open (or create) a store at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::InitFailed(e.to_string()))?;
        }

        debug!("Opening queue database at {:?}", path);
        let conn = Connection::open(path)
            .map_err(|e| StoreError::InitFailed(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::InitFailed(e.to_string()))?;

        let store = Self::with_connection(conn, Some(path.to_path_buf()))?;
        info!("Queue database initialized");
        Ok(store)
    }

    /// Throwaway store, mostly for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::InitFailed(e.to_string()))?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::InitFailed(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()).into())
    }

    fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::WriteError(e.to_string()))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| StoreError::WriteError(e.to_string()))?;
        Ok(value)
    }
}

impl Store for SqliteStore {
    fn file_info(&self, fid: FileId) -> Result<Option<FileInfo>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {FILE_COLUMNS} FROM files f WHERE f.fid = ?1");
        Ok(conn.query_row(&sql, params![fid], file_from_row).optional()?)
    }

    fn package_info(&self, pid: PackageId, with_stats: bool) -> Result<Option<PackageInfo>> {
        let conn = self.conn()?;
        let sql = if with_stats {
            format!("SELECT {PACKAGE_COLUMNS}, {} FROM packages p WHERE p.pid = ?1", stats_columns())
        } else {
            format!("SELECT {PACKAGE_COLUMNS} FROM packages p WHERE p.pid = ?1")
        };
        let info = conn
            .query_row(&sql, params![pid], |row| package_from_row(row, with_stats))
            .optional()?;
        Ok(info)
    }

    fn package_stats(&self, pid: PackageId) -> Result<PackageStats> {
        let conn = self.conn()?;
        let done = status_list(DownloadState::Finished);
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN dlstatus IN ({done}) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(size), 0),
                    COALESCE(SUM(CASE WHEN dlstatus IN ({done}) THEN size ELSE 0 END), 0)
             FROM files WHERE package = ?1"
        );
        let stats = conn.query_row(&sql, params![pid], |row| {
            Ok(PackageStats {
                links_total: row.get(0)?,
                links_done: row.get(1)?,
                size_total: row.get(2)?,
                size_done: row.get(3)?,
            })
        })?;
        Ok(stats)
    }

    fn all_packages(
        &self,
        root: Option<PackageRef>,
        owner: Option<UserId>,
    ) -> Result<HashMap<PackageId, PackageInfo>> {
        let mut sql = format!(
            "SELECT {PACKAGE_COLUMNS}, {} FROM packages p WHERE 1 = 1",
            stats_columns()
        );
        let mut values: Vec<Value> = Vec::new();

        match root {
            Some(PackageRef::Root) => {
                sql.push_str(" AND p.root = ?");
                values.push(Value::Integer(PackageRef::Root.raw()));
            }
            Some(PackageRef::Id(pid)) => {
                sql.push_str(" AND (p.root = ? OR p.pid = ?)");
                values.push(Value::Integer(pid));
                values.push(Value::Integer(pid));
            }
            None => {}
        }
        if let Some(owner) = owner {
            sql.push_str(" AND p.owner = ?");
            values.push(Value::Integer(owner));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| package_from_row(row, true))?;

        let mut packages = HashMap::new();
        for row in rows {
            let info = row?;
            if let PackageRef::Id(pid) = info.pid {
                packages.insert(pid, info);
            }
        }
        debug!("Fetched {} packages (root: {:?})", packages.len(), root);
        Ok(packages)
    }

    fn all_files(&self, filter: &FileFilter) -> Result<HashMap<FileId, FileInfo>> {
        let mut sql = format!("SELECT {FILE_COLUMNS} FROM files f WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();

        if let Some(package) = filter.package {
            sql.push_str(" AND f.package = ?");
            values.push(Value::Integer(package.raw()));
        }
        if let Some(state) = filter.state.filter(|s| *s != DownloadState::All) {
            sql.push_str(&format!(" AND f.dlstatus IN ({})", status_list(state)));
        }
        if let Some(ref search) = filter.search {
            sql.push_str(" AND f.name LIKE ?");
            values.push(Value::Text(format!("%{}%", search)));
        }
        if let Some(owner) = filter.owner {
            sql.push_str(" AND f.owner = ?");
            values.push(Value::Integer(owner));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), file_from_row)?;

        let mut files = HashMap::new();
        for row in rows {
            let info = row?;
            files.insert(info.fid, info);
        }
        Ok(files)
    }

    fn count_packages(&self, root: PackageRef) -> Result<u64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM packages WHERE root = ?1",
            params![root.raw()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_files(&self, pid: PackageId) -> Result<u64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE package = ?1",
            params![pid],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn add_links(&self, links: &[NewLink], pid: PackageId, owner: UserId) -> Result<Vec<FileId>> {
        let now = current_timestamp();
        let fids = self.with_transaction(|tx| {
            let start: i64 = tx.query_row(
                "SELECT COALESCE(MAX(fileorder) + 1, 0) FROM files WHERE package = ?1",
                params![pid],
                |row| row.get(0),
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO files (name, size, dlstatus, plugin, url, added, fileorder, package, owner)
                 VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut fids = Vec::with_capacity(links.len());
            for (offset, link) in (0_i64..).zip(links) {
                stmt.execute(params![
                    link.display_name(),
                    DownloadStatus::Queued.code(),
                    link.plugin,
                    link.url,
                    now,
                    start + offset,
                    pid,
                    owner,
                ])?;
                fids.push(tx.last_insert_rowid());
            }
            Ok(fids)
        })?;

        debug!("Inserted {} links into package {}", fids.len(), pid);
        Ok(fids)
    }

    fn add_package(&self, package: &NewPackage) -> Result<PackageId> {
        let status = if package.paused { PackageStatus::Paused } else { PackageStatus::Ok };
        let now = current_timestamp();
        self.with_transaction(|tx| {
            let order: i64 = tx.query_row(
                "SELECT COALESCE(MAX(packageorder) + 1, 0) FROM packages WHERE root = ?1",
                params![package.root.raw()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO packages (name, folder, root, owner, site, comment, password, added, status, packageorder)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    package.name,
                    package.folder,
                    package.root.raw(),
                    package.owner,
                    package.site,
                    package.comment,
                    package.password,
                    now,
                    status.code(),
                    order,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    fn update_file(&self, file: &FileInfo) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET name = ?1, size = ?2, dlstatus = ?3, error = ?4, hash = ?5 WHERE fid = ?6",
            params![file.name, file.size, file.status.code(), file.error, file.hash, file.fid],
        )?;
        Ok(())
    }

    fn update_package(&self, package: &PackageInfo) -> Result<()> {
        let Some(pid) = package.pid.id() else {
            return Ok(());
        };
        let conn = self.conn()?;
        conn.execute(
            "UPDATE packages SET name = ?1, folder = ?2, site = ?3, comment = ?4, password = ?5, status = ?6
             WHERE pid = ?7",
            params![
                package.name,
                package.folder,
                package.site,
                package.comment,
                package.password,
                package.status.code(),
                pid,
            ],
        )?;
        Ok(())
    }

    fn update_link_info(&self, updates: &[LinkInfoUpdate]) -> Result<usize> {
        let accepted = DownloadStatus::ALL
            .iter()
            .filter(|status| status.accepts_link_info())
            .map(|status| status.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        self.with_transaction(|tx| {
            let sql = format!(
                "UPDATE files SET name = ?1, size = ?2, dlstatus = ?3 WHERE url = ?4 AND dlstatus IN ({accepted})"
            );
            let mut stmt = tx.prepare(&sql)?;
            let mut touched = 0;
            for update in updates {
                touched += stmt.execute(params![
                    update.name,
                    update.size,
                    update.status.code(),
                    update.url,
                ])?;
            }
            Ok(touched)
        })
    }

    fn set_download_status(&self, fid: FileId, status: DownloadStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET dlstatus = ?1 WHERE fid = ?2",
            params![status.code(), fid],
        )?;
        Ok(())
    }

    fn delete_file(&self, fid: FileId) -> Result<()> {
        self.with_transaction(|tx| {
            let slot: Option<(PackageId, i64)> = tx
                .query_row(
                    "SELECT package, fileorder FROM files WHERE fid = ?1",
                    params![fid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((pid, order)) = slot else {
                return Ok(());
            };

            tx.execute("DELETE FROM files WHERE fid = ?1", params![fid])?;
            tx.execute(
                "UPDATE files SET fileorder = fileorder - 1 WHERE package = ?1 AND fileorder > ?2",
                params![pid, order],
            )?;
            Ok(())
        })
    }

    fn delete_package(&self, pid: PackageId) -> Result<Vec<PackageId>> {
        let deleted = self.with_transaction(|tx| {
            let slot: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT root, packageorder FROM packages WHERE pid = ?1",
                    params![pid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((root, order)) = slot else {
                return Ok(Vec::new());
            };

            let subtree: Vec<PackageId> = {
                let mut stmt = tx.prepare(
                    "WITH RECURSIVE sub(pid) AS (
                         SELECT ?1
                         UNION ALL
                         SELECT p.pid FROM packages p JOIN sub ON p.root = sub.pid
                     )
                     SELECT pid FROM sub",
                )?;
                let rows = stmt.query_map(params![pid], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for member in &subtree {
                tx.execute("DELETE FROM files WHERE package = ?1", params![member])?;
                tx.execute("DELETE FROM packages WHERE pid = ?1", params![member])?;
            }
            tx.execute(
                "UPDATE packages SET packageorder = packageorder - 1 WHERE root = ?1 AND packageorder > ?2",
                params![root, order],
            )?;
            Ok(subtree)
        })?;

        debug!("Deleted package {} with {} package(s) in total", pid, deleted.len());
        Ok(deleted)
    }

    fn order_package(&self, pid: PackageId, root: PackageRef, old: i64, position: i64) -> Result<()> {
        self.with_transaction(|tx| {
            if position > old {
                tx.execute(
                    "UPDATE packages SET packageorder = packageorder - 1
                     WHERE root = ?1 AND packageorder > ?2 AND packageorder <= ?3",
                    params![root.raw(), old, position],
                )?;
            } else if position < old {
                tx.execute(
                    "UPDATE packages SET packageorder = packageorder + 1
                     WHERE root = ?1 AND packageorder >= ?2 AND packageorder < ?3",
                    params![root.raw(), position, old],
                )?;
            }
            tx.execute(
                "UPDATE packages SET packageorder = ?1 WHERE pid = ?2",
                params![position, pid],
            )?;
            Ok(())
        })
    }

    fn order_files(&self, pid: PackageId, fids: &[FileId], start: i64, position: i64) -> Result<()> {
        let len = fids.len() as i64;
        self.with_transaction(|tx| {
            let first = if start > position {
                tx.execute(
                    "UPDATE files SET fileorder = fileorder + ?1
                     WHERE package = ?2 AND fileorder >= ?3 AND fileorder < ?4",
                    params![len, pid, position, start],
                )?;
                position
            } else if start < position {
                tx.execute(
                    "UPDATE files SET fileorder = fileorder - ?1
                     WHERE package = ?2 AND fileorder >= ?3 AND fileorder <= ?4",
                    params![len, pid, start + len, position],
                )?;
                position - len + 1
            } else {
                return Ok(());
            };

            let mut stmt = tx.prepare("UPDATE files SET fileorder = ?1 WHERE fid = ?2")?;
            for (index, fid) in (0_i64..).zip(fids) {
                stmt.execute(params![first + index, fid])?;
            }
            Ok(())
        })
    }

    fn move_package(&self, pid: PackageId, from: PackageRef, order: i64, dest: PackageRef) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE packages SET packageorder = packageorder - 1 WHERE root = ?1 AND packageorder > ?2",
                params![from.raw(), order],
            )?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(packageorder) + 1, 0) FROM packages WHERE root = ?1 AND pid != ?2",
                params![dest.raw(), pid],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE packages SET root = ?1, packageorder = ?2 WHERE pid = ?3",
                params![dest.raw(), next, pid],
            )?;
            Ok(())
        })
    }

    fn move_files(&self, fids: &[FileId], from: PackageId, dest: PackageId) -> Result<()> {
        self.with_transaction(|tx| {
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(fileorder) + 1, 0) FROM files WHERE package = ?1",
                params![dest],
                |row| row.get(0),
            )?;

            {
                let mut stmt = tx.prepare(
                    "UPDATE files SET package = ?1, fileorder = ?2 WHERE fid = ?3 AND package = ?4",
                )?;
                for (offset, fid) in (0_i64..).zip(fids) {
                    stmt.execute(params![dest, next + offset, fid, from])?;
                }
            }

            renumber_files(tx, from)
        })
    }

    fn restart_file(&self, fid: FileId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET dlstatus = ?1, error = '', name = url WHERE fid = ?2",
            params![DownloadStatus::Queued.code(), fid],
        )?;
        Ok(())
    }

    fn restart_package(&self, pid: PackageId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET dlstatus = ?1, error = '', name = url WHERE package = ?2",
            params![DownloadStatus::Queued.code(), pid],
        )?;
        Ok(())
    }

    fn restart_failed(&self) -> Result<usize> {
        let conn = self.conn()?;
        let sql = format!(
            "UPDATE files SET dlstatus = ?1, error = '' WHERE dlstatus IN ({})",
            status_list(DownloadState::Failed)
        );
        let restarted = conn.execute(&sql, params![DownloadStatus::Queued.code()])?;
        info!("Restarted {} failed file(s)", restarted);
        Ok(restarted)
    }

    fn queue_stats(&self, user: Option<UserId>) -> Result<QueueStats> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files
             WHERE dlstatus IN ({}) AND (?1 IS NULL OR owner = ?1)",
            status_list(DownloadState::Unmanaged)
        );
        let stats = conn.query_row(&sql, params![user], |row| {
            Ok(QueueStats { files: row.get(0)?, bytes: row.get(1)? })
        })?;
        Ok(stats)
    }

    fn download_stats(&self, user: Option<UserId>) -> Result<DownloadStats> {
        let conn = self.conn()?;
        let done = status_list(DownloadState::Finished);
        let sql = format!(
            "SELECT COALESCE(SUM(CASE WHEN dlstatus IN ({done}) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN dlstatus IN ({done}) THEN size ELSE 0 END), 0),
                    COUNT(*),
                    COALESCE(SUM(size), 0)
             FROM files WHERE (?1 IS NULL OR owner = ?1)"
        );
        let stats = conn.query_row(&sql, params![user], |row| {
            Ok(DownloadStats {
                done_files: row.get(0)?,
                done_bytes: row.get(1)?,
                total_files: row.get(2)?,
                total_bytes: row.get(3)?,
            })
        })?;
        Ok(stats)
    }

    fn process_count(&self, exclude: Option<FileId>, user: Option<UserId>) -> Result<u64> {
        let processable = DownloadStatus::ALL
            .iter()
            .filter(|status| status.is_processable())
            .map(|status| status.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn()?;
        let sql = format!(
            "SELECT COUNT(*) FROM files
             WHERE dlstatus IN ({processable}) AND fid != ?1 AND (?2 IS NULL OR owner = ?2)"
        );
        let count = conn.query_row(&sql, params![exclude.unwrap_or(-1), user], |row| row.get(0))?;
        Ok(count)
    }

    fn unfinished(&self, pid: PackageId) -> Result<Vec<FileId>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT fid FROM files WHERE package = ?1 AND dlstatus IN ({}) LIMIT 3",
            status_list(DownloadState::Unfinished)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pid], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn jobs(&self, occupied: &[String]) -> Result<Vec<(UserId, FileId)>> {
        let candidates = DownloadStatus::ALL
            .iter()
            .filter(|status| status.is_job_candidate())
            .map(|status| status.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT f.owner, f.fid FROM files f INNER JOIN packages p ON f.package = p.pid
             WHERE p.status = {} AND f.dlstatus IN ({candidates})",
            PackageStatus::Ok.code()
        );
        if !occupied.is_empty() {
            let placeholders = vec!["?"; occupied.len()].join(", ");
            sql.push_str(&format!(" AND f.plugin NOT IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY p.packageorder ASC, f.fileorder ASC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(occupied.iter()), |row| {
            Ok((row.get::<_, UserId>(0)?, row.get::<_, FileId>(1)?))
        })?;

        let mut jobs: Vec<(UserId, FileId)> = Vec::new();
        for row in rows {
            let (owner, fid) = row?;
            if !jobs.iter().any(|(seen, _)| *seen == owner) {
                jobs.push((owner, fid));
            }
        }
        Ok(jobs)
    }

    fn commit(&self) -> Result<()> {
        let conn = self.conn()?;
        if self.path.is_some() {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
                .map_err(|e| StoreError::WriteError(e.to_string()))?;
        }
        Ok(())
    }
}

fn renumber_files(tx: &Transaction<'_>, pid: PackageId) -> Result<()> {
    let remaining: Vec<FileId> = {
        let mut stmt = tx.prepare("SELECT fid FROM files WHERE package = ?1 ORDER BY fileorder ASC")?;
        let rows = stmt.query_map(params![pid], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut stmt = tx.prepare("UPDATE files SET fileorder = ?1 WHERE fid = ?2")?;
    for (order, fid) in (0_i64..).zip(&remaining) {
        stmt.execute(params![order, fid])?;
    }
    Ok(())
}

fn stats_columns() -> String {
    let done = status_list(DownloadState::Finished);
    format!(
        "(SELECT COUNT(*) FROM files s WHERE s.package = p.pid),
         (SELECT COUNT(*) FROM files s WHERE s.package = p.pid AND s.dlstatus IN ({done})),
         (SELECT COALESCE(SUM(s.size), 0) FROM files s WHERE s.package = p.pid),
         (SELECT COALESCE(SUM(s.size), 0) FROM files s WHERE s.package = p.pid AND s.dlstatus IN ({done}))"
    )
}

fn status_list(state: DownloadState) -> String {
    state
        .statuses()
        .iter()
        .map(|status| status.code().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileInfo> {
    Ok(FileInfo {
        fid: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        status: DownloadStatus::from_code(row.get(3)?),
        error: row.get(4)?,
        plugin: row.get(5)?,
        url: row.get(6)?,
        hash: row.get(7)?,
        added: row.get(8)?,
        order: row.get(9)?,
        package: row.get(10)?,
        owner: row.get(11)?,
    })
}

fn package_from_row(row: &Row<'_>, with_stats: bool) -> rusqlite::Result<PackageInfo> {
    let stats = if with_stats {
        Some(PackageStats {
            links_total: row.get(11)?,
            links_done: row.get(12)?,
            size_total: row.get(13)?,
            size_done: row.get(14)?,
        })
    } else {
        None
    };

    Ok(PackageInfo {
        pid: PackageRef::Id(row.get(0)?),
        name: row.get(1)?,
        folder: row.get(2)?,
        root: PackageRef::from_raw(row.get(3)?),
        owner: row.get(4)?,
        site: row.get(5)?,
        comment: row.get(6)?,
        password: row.get(7)?,
        added: row.get(8)?,
        status: PackageStatus::from_code(row.get(9)?),
        order: row.get(10)?,
        stats,
        pids: Vec::new(),
        fids: Vec::new(),
    })
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn links(urls: &[&str]) -> Vec<NewLink> {
        urls.iter().map(|url| NewLink::new(*url, "BasePlugin")).collect()
    }

    fn file_orders(store: &SqliteStore, pid: PackageId) -> Vec<(FileId, i64)> {
        let mut orders: Vec<_> = store
            .all_files(&FileFilter::new().package(PackageRef::Id(pid)))
            .unwrap()
            .into_values()
            .map(|f| (f.fid, f.order))
            .collect();
        orders.sort_by_key(|(_, order)| *order);
        orders
    }

    #[test]
    fn test_add_package_assigns_dense_order() {
        let store = create_test_store();
        let a = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let b = store.add_package(&NewPackage::new("B", PackageRef::Root, 0)).unwrap();
        let child = store.add_package(&NewPackage::new("C", PackageRef::Id(a), 0)).unwrap();

        assert_eq!(store.package_info(a, false).unwrap().unwrap().order, 0);
        assert_eq!(store.package_info(b, false).unwrap().unwrap().order, 1);
        let child = store.package_info(child, true).unwrap().unwrap();
        assert_eq!(child.order, 0);
        assert_eq!(child.root, PackageRef::Id(a));
        assert_eq!(child.stats, Some(PackageStats::default()));
    }

    #[test]
    fn test_scoped_packages_include_parent() {
        let store = create_test_store();
        let a = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let child = store.add_package(&NewPackage::new("C", PackageRef::Id(a), 0)).unwrap();
        let other = store.add_package(&NewPackage::new("B", PackageRef::Root, 0)).unwrap();

        let scoped = store.all_packages(Some(PackageRef::Id(a)), None).unwrap();
        assert!(scoped.contains_key(&a));
        assert!(scoped.contains_key(&child));
        assert!(!scoped.contains_key(&other));

        let top = store.all_packages(Some(PackageRef::Root), None).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(store.all_packages(None, None).unwrap().len(), 3);
    }

    #[test]
    fn test_links_get_names_and_orders() {
        let store = create_test_store();
        let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let fids = store
            .add_links(&links(&["http://host.example/a.bin", "http://host.example/b.bin"]), pid, 0)
            .unwrap();

        let first = store.file_info(fids[0]).unwrap().unwrap();
        assert_eq!(first.name, "a.bin");
        assert_eq!(first.status, DownloadStatus::Queued);
        assert_eq!(file_orders(&store, pid), vec![(fids[0], 0), (fids[1], 1)]);
        assert!(store.file_info(9999).unwrap().is_none());
    }

    #[test]
    fn test_delete_file_compacts_siblings() {
        let store = create_test_store();
        let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let fids = store.add_links(&links(&["u0", "u1", "u2"]), pid, 0).unwrap();

        store.delete_file(fids[1]).unwrap();
        assert_eq!(file_orders(&store, pid), vec![(fids[0], 0), (fids[2], 1)]);
    }

    #[test]
    fn test_delete_package_removes_subtree() {
        let store = create_test_store();
        let a = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let b = store.add_package(&NewPackage::new("B", PackageRef::Root, 0)).unwrap();
        let nested = store.add_package(&NewPackage::new("N", PackageRef::Id(a), 0)).unwrap();
        store.add_links(&links(&["u0"]), nested, 0).unwrap();

        let mut deleted = store.delete_package(a).unwrap();
        deleted.sort();
        assert_eq!(deleted, vec![a, nested]);
        assert!(store.package_info(nested, false).unwrap().is_none());
        assert_eq!(store.count_files(nested).unwrap(), 0);
        assert_eq!(store.package_info(b, false).unwrap().unwrap().order, 0);
    }

    #[test]
    fn test_order_files_both_directions() {
        let store = create_test_store();
        let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let f = store.add_links(&links(&["u0", "u1", "u2", "u3"]), pid, 0).unwrap();

        store.order_files(pid, &[f[1], f[2]], 1, 3).unwrap();
        assert_eq!(file_orders(&store, pid), vec![(f[0], 0), (f[3], 1), (f[1], 2), (f[2], 3)]);

        store.order_files(pid, &[f[1], f[2]], 2, 0).unwrap();
        assert_eq!(file_orders(&store, pid), vec![(f[1], 0), (f[2], 1), (f[0], 2), (f[3], 3)]);
    }

    #[test]
    fn test_move_files_renumbers_source() {
        let store = create_test_store();
        let a = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let b = store.add_package(&NewPackage::new("B", PackageRef::Root, 0)).unwrap();
        let fa = store.add_links(&links(&["a0", "a1", "a2"]), a, 0).unwrap();
        let fb = store.add_links(&links(&["b0"]), b, 0).unwrap();

        store.move_files(&[fa[0], fa[2]], a, b).unwrap();
        assert_eq!(file_orders(&store, a), vec![(fa[1], 0)]);
        assert_eq!(file_orders(&store, b), vec![(fb[0], 0), (fa[0], 1), (fa[2], 2)]);
    }

    #[test]
    fn test_stats_and_jobs() {
        let store = create_test_store();
        let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 7)).unwrap();
        let paused = store
            .add_package(&NewPackage { paused: true, ..NewPackage::new("P", PackageRef::Root, 7) })
            .unwrap();
        let f = store.add_links(&links(&["u0", "u1"]), pid, 7).unwrap();
        store.add_links(&links(&["u2"]), paused, 7).unwrap();
        store.set_download_status(f[0], DownloadStatus::Finished).unwrap();

        assert_eq!(store.queue_stats(None).unwrap().files, 2);
        assert_eq!(store.queue_stats(Some(8)).unwrap().files, 0);
        let downloads = store.download_stats(Some(7)).unwrap();
        assert_eq!((downloads.done_files, downloads.total_files), (1, 3));
        assert_eq!(store.process_count(Some(f[1]), None).unwrap(), 1);
        assert_eq!(store.unfinished(pid).unwrap(), vec![f[1]]);

        assert_eq!(store.jobs(&[]).unwrap(), vec![(7, f[1])]);
        assert!(store.jobs(&["BasePlugin".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_restart_failed_only_touches_failed() {
        let store = create_test_store();
        let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
        let f = store.add_links(&links(&["u0", "u1"]), pid, 0).unwrap();
        store.set_download_status(f[0], DownloadStatus::Aborted).unwrap();
        store.set_download_status(f[1], DownloadStatus::Finished).unwrap();

        assert_eq!(store.restart_failed().unwrap(), 1);
        assert_eq!(store.file_info(f[0]).unwrap().unwrap().status, DownloadStatus::Queued);
        assert_eq!(store.file_info(f[1]).unwrap().unwrap().status, DownloadStatus::Finished);
    }

    #[test]
    fn test_on_disk_store_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.db");
        let pid = {
            let store = SqliteStore::open(&path).unwrap();
            let pid = store.add_package(&NewPackage::new("A", PackageRef::Root, 0)).unwrap();
            store.commit().unwrap();
            pid
        };

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.package_info(pid, false).unwrap().unwrap().name, "A");
    }
}
