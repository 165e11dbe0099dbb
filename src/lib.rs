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

//! LinkVault: an in-memory index and consistency layer over a SQLite
//! download queue.
//!
//! The [`manager::FileManager`] owns a cache of files and packages on top of
//! a [`store::Store`]. Every mutation goes through it, so cached entities,
//! sibling orders and memoized aggregates stay coherent with the store, and
//! subscribers of [`events::EventBus`] learn about each change.

pub mod cache;
pub mod cli;
pub mod core;
pub mod events;
pub mod manager;
pub mod store;
pub mod ui;
pub mod worker;

pub use crate::core::error::{LinkVaultError, Result};
pub use crate::manager::FileManager;
