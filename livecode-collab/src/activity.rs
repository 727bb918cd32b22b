//! Bounded activity log of human-readable session events.
//!
//! Entries are kept in arrival order. Once `capacity` is reached each
//! append evicts the oldest entry.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Category of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Connection lifecycle and room snapshots
    System,
    /// Buffer replaced by another participant
    Update,
    Join,
    Leave,
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub text: String,
    /// Wall clock at append, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Append-only ring of activity entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    /// Create an empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an entry stamped with the current time.
    pub fn append(&mut self, kind: ActivityKind, text: impl Into<String>) {
        self.push(ActivityEntry {
            kind,
            text: text.into(),
            timestamp: unix_millis(),
        });
    }

    /// Append a pre-built entry, evicting the oldest on overflow.
    pub fn push(&mut self, entry: ActivityEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        log::trace!("activity[{:?}] {}", entry.kind, entry.text);
        self.entries.push_back(entry);
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// All retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Most recently appended entry.
    pub fn last(&self) -> Option<&ActivityEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
