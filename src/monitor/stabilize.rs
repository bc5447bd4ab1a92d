// src/monitor/stabilize.rs

//! Write-completion heuristic.
//!
//! A change notification arrives as soon as a writer starts, not when it is
//! done. An action is therefore only released once its target's size has been
//! seen unchanged on two consecutive polls. Targets that no longer exist are
//! released immediately, which covers removals and creations that raced with
//! a delete.

use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::monitor::action::PendingAction;
use crate::source::EntryId;

/// Pending actions owned by the thread that calls `update`.
#[derive(Debug, Default)]
pub struct Stabilizer {
    pending: Vec<PendingAction>,
}

impl Stabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly drained actions. An action identical to one already
    /// waiting (same watch, kind and paths) is merged into it.
    pub fn absorb(&mut self, incoming: impl IntoIterator<Item = PendingAction>) {
        for action in incoming {
            if self.pending.iter().any(|queued| queued.same_change(&action)) {
                trace!(path = ?action.path, kind = ?action.kind, "duplicate change merged");
                continue;
            }
            self.pending.push(action);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget actions whose watch no longer exists.
    pub fn retain_entries(&mut self, mut live: impl FnMut(EntryId) -> bool) {
        let before = self.pending.len();
        self.pending.retain(|action| live(action.entry));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "discarded pending actions of stopped watches");
        }
    }

    /// Sample every pending action once and return those that are ready, in
    /// the order they were queued.
    pub fn poll(&mut self, fs: &dyn FileSystem) -> Vec<PendingAction> {
        let mut ready = Vec::new();
        let mut waiting = Vec::with_capacity(self.pending.len());

        for mut action in self.pending.drain(..) {
            if is_stable(&mut action, fs) {
                ready.push(action);
            } else {
                waiting.push(action);
            }
        }

        self.pending = waiting;
        ready
    }
}

/// Apply one poll to `action`. Returns `true` once it may be emitted.
fn is_stable(action: &mut PendingAction, fs: &dyn FileSystem) -> bool {
    if !fs.exists(&action.path) {
        return true;
    }

    let size = match fs.file_size(&action.path) {
        Ok(size) => size,
        Err(err) => {
            // Vanished between the two calls.
            trace!(path = ?action.path, error = %err, "size probe failed; releasing action");
            return true;
        }
    };

    if !action.sampled {
        action.sampled = true;
        action.last_size = size;
        return false;
    }

    if action.last_size != size {
        trace!(path = ?action.path, from = action.last_size, to = size, "still growing");
        action.last_size = size;
        return false;
    }

    true
}
