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

//! Error handling for LinkVault - structured errors with context and recovery suggestions.

use crate::core::types::{FileId, PackageRef};
use std::fmt;
use thiserror::Error;

/// Result type alias for LinkVault operations
pub type Result<T> = std::result::Result<T, LinkVaultError>;

/// Main error type for LinkVault
#[derive(Error, Debug)]
pub enum LinkVaultError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistent store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Rejected queue operations
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic wrapped error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store initialization failed: {0}")]
    InitFailed(String),

    #[error("Store read error: {0}")]
    ReadError(String),

    #[error("Store write error: {0}")]
    WriteError(String),

    #[error("Store corrupted: {0}")]
    Corrupted(String),

    #[error("Store is locked: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Queue operations rejected before any state was touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Package does not exist: {0}")]
    PackageDoesNotExist(PackageRef),

    #[error("File does not exist: {0}")]
    FileDoesNotExist(FileId),

    #[error("Tried to reorder non continuous block of files (orders {min}..={max}, {len} files)")]
    NonContiguousBlock { min: i64, max: i64, len: usize },

    #[error("No files given")]
    EmptyBlock,

    #[error("File {0} is listed more than once")]
    DuplicateFile(FileId),

    #[error("Files belong to different packages")]
    MixedPackages,

    #[error("Position {position} is outside of 0..{len}")]
    PositionOutOfRange { position: i64, len: usize },

    #[error("Cannot move package {pid} into its own subtree ({dest})")]
    CyclicMove { pid: PackageRef, dest: PackageRef },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Busy(err.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::DatabaseCorrupt =>
            {
                StoreError::Corrupted(err.to_string())
            }
            other => StoreError::DatabaseError(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for LinkVaultError {
    fn from(err: rusqlite::Error) -> Self {
        LinkVaultError::Store(err.into())
    }
}

impl From<serde_json::Error> for LinkVaultError {
    fn from(err: serde_json::Error) -> Self {
        LinkVaultError::Serialization(err.to_string())
    }
}

impl LinkVaultError {
    /// Get an error code for scripting purposes
    pub fn code(&self) -> &'static str {
        match self {
            LinkVaultError::Config(_) => "E001",
            LinkVaultError::Store(_) => "E010",
            LinkVaultError::Queue(_) => "E020",
            LinkVaultError::Io(_) => "E070",
            LinkVaultError::Serialization(_) => "E080",
            LinkVaultError::Other(_) => "E999",
        }
    }

    /// Get a recovery suggestion for this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            LinkVaultError::Config(_) => {
                Some("Check your config file at ~/.config/linkvault/config.toml")
            }
            LinkVaultError::Store(StoreError::Corrupted(_)) => {
                Some("The queue database is damaged. Restore a backup or remove ~/.local/share/linkvault/queue.db")
            }
            LinkVaultError::Store(StoreError::Busy(_)) => {
                Some("Another process holds the queue database. Retry once it finished")
            }
            LinkVaultError::Queue(QueueError::PackageDoesNotExist(_)) => {
                Some("List packages with 'linkvault tree' to find a valid id")
            }
            LinkVaultError::Queue(QueueError::NonContiguousBlock { .. }) => {
                Some("Only adjacent files can be reordered together")
            }
            LinkVaultError::Queue(QueueError::PositionOutOfRange { .. }) => {
                Some("Positions start at 0 and must be below the number of siblings")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkVaultError::Store(StoreError::Busy(_)))
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: fmt::Display>(self, context: C) -> Result<T>;

    /// Add context lazily
    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<LinkVaultError>> ResultExt<T> for std::result::Result<T, E> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            LinkVaultError::Other(anyhow::anyhow!("{}: {}", context, err))
        })
    }

    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            LinkVaultError::Other(anyhow::anyhow!("{}: {}", f(), err))
        })
    }
}

/// Helper macro for creating package not found errors
#[macro_export]
macro_rules! package_missing {
    ($pid:expr) => {
        $crate::core::error::LinkVaultError::Queue(
            $crate::core::error::QueueError::PackageDoesNotExist($pid.into())
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = LinkVaultError::Config("test".to_string());
        assert_eq!(err.code(), "E001");

        let err = LinkVaultError::Queue(QueueError::EmptyBlock);
        assert_eq!(err.code(), "E020");
    }

    #[test]
    fn test_error_suggestions() {
        let err = LinkVaultError::Queue(QueueError::NonContiguousBlock { min: 0, max: 3, len: 3 });
        assert!(err.suggestion().unwrap().contains("adjacent"));
        assert!(LinkVaultError::Serialization("x".into()).suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        let busy = LinkVaultError::Store(StoreError::Busy("locked".to_string()));
        assert!(busy.is_retryable());

        let missing = package_missing!(PackageRef::Id(4));
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = QueueError::PackageDoesNotExist(PackageRef::Id(7));
        assert_eq!(err.to_string(), "Package does not exist: 7");

        let err = QueueError::NonContiguousBlock { min: 0, max: 3, len: 3 };
        assert!(err.to_string().starts_with("Tried to reorder non continuous block"));
    }

    #[test]
    fn test_sqlite_error_mapping() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::DatabaseError(_)));
    }
}
