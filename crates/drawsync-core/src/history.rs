//! Snapshot history with a current-position pointer.
//!
//! Appends always go to the end of the sequence and move the pointer there.
//! Restoring only moves the pointer: entries ahead of it stay reachable, so
//! no version produced during the session is ever discarded short of an
//! explicit [`History::clear`].

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SnapshotOrigin {
    /// A full replacement issued by the agent.
    Display,
    /// A successfully patched edit batch.
    Edit { edits: usize },
    /// Loaded directly by the host (initial document, CLI input).
    Host,
}

/// An immutable full document captured at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    document: Arc<str>,
    origin: SnapshotOrigin,
    taken_at: SystemTime,
}

impl Snapshot {
    pub fn new(document: &str, origin: SnapshotOrigin) -> Self {
        Self {
            document: Arc::from(document),
            origin,
            taken_at: SystemTime::now(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }
}

/// Errors from browsing the history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("history position {position} out of range (history holds {len} snapshots)")]
    OutOfRange { position: usize, len: usize },
}

/// Ordered snapshots plus the position of the one currently shown.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: Vec<Snapshot>,
    cursor: Option<usize>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot at the end and point at it. Returns its position.
    pub fn push(&mut self, snapshot: Snapshot) -> usize {
        self.snapshots.push(snapshot);
        let position = self.snapshots.len() - 1;
        self.cursor = Some(position);
        position
    }

    /// Move the pointer to an existing position without touching any entry.
    pub fn restore(&mut self, position: usize) -> Result<&Snapshot, HistoryError> {
        let len = self.snapshots.len();
        let snapshot = self
            .snapshots
            .get(position)
            .ok_or(HistoryError::OutOfRange { position, len })?;
        self.cursor = Some(position);
        Ok(snapshot)
    }

    /// Drop every snapshot and the pointer.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }

    /// The snapshot under the pointer.
    pub fn current(&self) -> Option<&Snapshot> {
        self.cursor.and_then(|i| self.snapshots.get(i))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn get(&self, position: usize) -> Option<&Snapshot> {
        self.snapshots.get(position)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}
