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

//! Change notifications for LinkVault.

use crate::core::types::{FileId, PackageId, PackageInfo, PackageRef};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events a lagging subscriber may fall behind
pub const DEFAULT_CAPACITY: usize = 256;

/// A state change observed by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PackageUpdated { pid: PackageId },
    PackageInserted { pid: PackageId, root: PackageRef, order: i64 },
    PackageDeleted { pid: PackageId },
    PackageReordered { pid: PackageId, position: i64, root: PackageRef },
    FileUpdated { fid: FileId },
    FileDeleted { fid: FileId, pid: PackageId },
    FileReordered { pid: PackageId },
    AllFinished,
    AllProcessed,
    PackageFinished { package: PackageInfo },
}

impl Event {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Event::PackageUpdated { .. } => "package:updated",
            Event::PackageInserted { .. } => "package:inserted",
            Event::PackageDeleted { .. } => "package:deleted",
            Event::PackageReordered { .. } => "package:reordered",
            Event::FileUpdated { .. } => "file:updated",
            Event::FileDeleted { .. } => "file:deleted",
            Event::FileReordered { .. } => "file:reordered",
            Event::AllFinished => "download:allFinished",
            Event::AllProcessed => "download:allProcessed",
            Event::PackageFinished { .. } => "package:finished",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PackageUpdated { pid } | Event::PackageDeleted { pid } | Event::FileReordered { pid } => {
                write!(f, "{}({})", self.name(), pid)
            }
            Event::PackageInserted { pid, root, order } => {
                write!(f, "{}({}, {}, {})", self.name(), pid, root, order)
            }
            Event::PackageReordered { pid, position, root } => {
                write!(f, "{}({}, {}, {})", self.name(), pid, position, root)
            }
            Event::FileUpdated { fid } => write!(f, "{}({})", self.name(), fid),
            Event::FileDeleted { fid, pid } => write!(f, "{}({}, {})", self.name(), fid, pid),
            Event::AllFinished | Event::AllProcessed => f.write_str(self.name()),
            Event::PackageFinished { package } => write!(f, "{}({})", self.name(), package.pid),
        }
    }
}

/// Receiver side of event dispatch
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: Event);
}

/// Fan-out of events to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn dispatch(&self, event: Event) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {}", name);
        }
    }
}

/// Drain everything currently queued on a receiver
pub fn drain(receiver: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::PackageUpdated { pid: 1 }.name(), "package:updated");
        assert_eq!(Event::AllFinished.name(), "download:allFinished");
        assert_eq!(Event::FileDeleted { fid: 2, pid: 1 }.to_string(), "file:deleted(2, 1)");
        assert_eq!(
            Event::PackageInserted { pid: 4, root: PackageRef::Root, order: 0 }.to_string(),
            "package:inserted(4, root, 0)"
        );
    }

    #[test]
    fn test_bus_delivers_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.dispatch(Event::FileUpdated { fid: 1 });
        bus.dispatch(Event::AllProcessed);

        assert_eq!(drain(&mut rx), vec![Event::FileUpdated { fid: 1 }, Event::AllProcessed]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.dispatch(Event::AllFinished);
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_string(&Event::PackageReordered {
            pid: 3,
            position: 1,
            root: PackageRef::Root,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"package_reordered","pid":3,"position":1,"root":-1}"#);
    }
}
