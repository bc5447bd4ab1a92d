// src/monitor/action.rs

use std::path::{Path, PathBuf};

use crate::source::EntryId;

/// User-facing kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Added,
    Removed,
    Modified,
    Renamed,
}

/// A change waiting for its target to stop growing before it is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    /// Watch that produced this action.
    pub entry: EntryId,
    pub kind: ActionKind,
    /// Path the change refers to; for renames, the new name.
    pub path: PathBuf,
    /// Previous name; only set for [`ActionKind::Renamed`].
    pub old_path: Option<PathBuf>,
    /// Size seen at the last `update` that sampled this action.
    pub last_size: u64,
    /// Whether `last_size` holds a real sample yet.
    pub sampled: bool,
}

impl PendingAction {
    pub fn new(entry: EntryId, kind: ActionKind, path: PathBuf) -> Self {
        Self {
            entry,
            kind,
            path,
            old_path: None,
            last_size: 0,
            sampled: false,
        }
    }

    pub fn renamed(entry: EntryId, old_path: PathBuf, new_path: PathBuf) -> Self {
        Self {
            old_path: Some(old_path),
            ..Self::new(entry, ActionKind::Renamed, new_path)
        }
    }

    /// Whether `other` reports the same change on the same watch.
    pub fn same_change(&self, other: &PendingAction) -> bool {
        self.entry == other.entry
            && self.kind == other.kind
            && self.path == other.path
            && self.old_path == other.old_path
    }

    /// Previous name of a rename, or the path itself for other kinds.
    pub fn previous_path(&self) -> &Path {
        self.old_path.as_deref().unwrap_or(&self.path)
    }
}
