// src/monitor/worker.rs

//! The single background thread that drives every entry's I/O.
//!
//! The loop blocks on the completion port and, for each completion, looks the
//! entry up by id and dispatches on its current state. It never touches any
//! entry other than the one the completion names.

use std::io;
use std::path::Path;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, trace, warn};

use crate::errors::{MonitorError, Result};
use crate::monitor::action::{ActionKind, PendingAction};
use crate::monitor::entry::{EntryArena, EntryEvent, EntryInner, MonitorState, WatchEntry};
use crate::monitor::queue::ActionSender;
use crate::source::{
    completion_port, ChangeRecords, Completion, CompletionPort, CompletionQueue,
    CompletionStatus, RawChangeKind,
};

const THREAD_NAME: &str = "foldermon-worker";

/// Handle to a running worker thread.
#[derive(Debug)]
pub(crate) struct Worker {
    port: CompletionPort,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(arena: EntryArena, actions: ActionSender, ignore_hidden: bool) -> Result<Self> {
        let (port, queue) = completion_port();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let ctx = WorkerContext {
                    arena,
                    actions,
                    ignore_hidden,
                };
                ctx.run(queue);
            })
            .map_err(MonitorError::WorkerSpawn)?;

        debug!("worker thread started");
        Ok(Self {
            port,
            thread: Some(thread),
        })
    }

    /// Port that sources and the owning thread post completions to.
    pub fn port(&self) -> CompletionPort {
        self.port.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wake the worker, make it exit and wait for it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.port.post(Completion::Shutdown);
        if thread.join().is_err() {
            error!("worker thread panicked");
        } else {
            debug!("worker thread joined");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

struct WorkerContext {
    arena: EntryArena,
    actions: ActionSender,
    ignore_hidden: bool,
}

impl WorkerContext {
    fn run(&self, mut queue: CompletionQueue) {
        while let Some(completion) = queue.wait() {
            let (id, status) = match completion {
                Completion::Shutdown => break,
                Completion::Entry { id, status } => (id, status),
            };

            // Late completions for removed entries are expected after a stop.
            let Some(entry) = self.arena.get(id) else {
                trace!(entry = id, ?status, "completion for unknown entry dropped");
                continue;
            };

            self.dispatch(&entry, status);
        }
        debug!("worker loop finished");
    }

    fn dispatch(&self, entry: &WatchEntry, status: CompletionStatus) {
        let mut inner = entry.lock();

        match inner.state {
            MonitorState::Inactive => {
                trace!(entry = entry.id(), ?status, "completion for inactive entry ignored");
            }
            MonitorState::Starting => start(entry, &mut inner),
            MonitorState::Monitoring => match status {
                CompletionStatus::Filled(bytes) => {
                    let batch = self.convert(entry, &mut inner, &bytes);
                    self.actions.push_batch(batch);
                    reissue(entry, &mut inner);
                }
                CompletionStatus::Failed(err) => pin(entry, &mut inner, err),
                CompletionStatus::Nudge | CompletionStatus::Cancelled => {
                    trace!(entry = entry.id(), ?status, "spurious completion while monitoring");
                }
            },
            MonitorState::Shutdown => close(entry, &mut inner),
            MonitorState::Shutdown2 => {
                if matches!(status, CompletionStatus::Cancelled) {
                    inner.apply(EntryEvent::CloseConfirmed);
                    debug!(entry = entry.id(), path = ?entry.path(), "watch stopped");
                    inner.reply(Ok(()));
                } else {
                    trace!(entry = entry.id(), ?status, "waiting for close confirmation");
                }
            }
        }
    }

    /// Turn one filled batch into pending actions.
    fn convert(&self, entry: &WatchEntry, inner: &mut EntryInner, bytes: &[u8]) -> Vec<PendingAction> {
        let id = entry.id();
        let mut records = ChangeRecords::new(bytes, entry.path());
        let mut out = Vec::new();

        for event in records.by_ref() {
            trace!(entry = id, kind = ?event.kind, path = ?event.path, "raw change");
            let action = match event.kind {
                RawChangeKind::Added => PendingAction::new(id, ActionKind::Added, event.path),
                RawChangeKind::Removed => PendingAction::new(id, ActionKind::Removed, event.path),
                RawChangeKind::Modified => PendingAction::new(id, ActionKind::Modified, event.path),
                RawChangeKind::RenamedOld => {
                    match inner.pending_old_name.replace(event.path) {
                        // The earlier file was moved out of the tree.
                        Some(previous) => PendingAction::new(id, ActionKind::Removed, previous),
                        None => continue,
                    }
                }
                RawChangeKind::RenamedNew => match inner.pending_old_name.take() {
                    Some(old) => PendingAction::renamed(id, old, event.path),
                    None => {
                        debug!(entry = id, path = ?event.path, "rename without old name; reporting as added");
                        PendingAction::new(id, ActionKind::Added, event.path)
                    }
                },
                RawChangeKind::Unknown(code) => {
                    warn!(entry = id, code, path = ?event.path, "unknown change record skipped");
                    continue;
                }
            };

            if let Some(action) = self.visible(action) {
                out.push(action);
            }
        }

        // Halves of one rename always share a batch; an old name still
        // cached here left the watched tree.
        if let Some(old) = inner.pending_old_name.take() {
            trace!(entry = id, path = ?old, "rename without new name; reporting as removed");
            if let Some(action) = self.visible(PendingAction::new(id, ActionKind::Removed, old)) {
                out.push(action);
            }
        }

        if records.is_truncated() {
            warn!(
                entry = id,
                parsed = out.len(),
                "malformed change batch; remaining records dropped"
            );
        }
        out
    }

    /// Apply hidden-file suppression. A rename across the hidden boundary
    /// degrades to the visible half.
    fn visible(&self, action: PendingAction) -> Option<PendingAction> {
        if !self.ignore_hidden {
            return Some(action);
        }

        let old_hidden = action.old_path.as_deref().map(is_hidden);
        match (old_hidden, is_hidden(&action.path)) {
            (None, true) | (Some(true), true) => {
                trace!(path = ?action.path, "hidden file ignored");
                None
            }
            (None, false) | (Some(false), false) => Some(action),
            (Some(true), false) => Some(PendingAction::new(action.entry, ActionKind::Added, action.path)),
            (Some(false), true) => action
                .old_path
                .map(|old| PendingAction::new(action.entry, ActionKind::Removed, old)),
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Issue the first read; answer the waiting caller either way.
fn start(entry: &WatchEntry, inner: &mut EntryInner) {
    let result = match inner.handle.as_mut() {
        Some(handle) => handle.read_changes(),
        None => Err(io::Error::new(io::ErrorKind::NotConnected, "no directory handle")),
    };

    match result {
        Ok(()) => {
            inner.apply(EntryEvent::ReadIssued);
            info!(entry = entry.id(), path = ?entry.path(), "monitoring");
            inner.reply(Ok(()));
        }
        Err(source) => {
            if let Some(mut handle) = inner.handle.take() {
                handle.close();
            }
            inner.apply(EntryEvent::ReadFailed);
            warn!(entry = entry.id(), path = ?entry.path(), error = %source, "first read failed");
            inner.reply(Err(MonitorError::ReadFailed {
                path: entry.path().to_path_buf(),
                source,
            }));
        }
    }
}

/// Keep the entry polling after a delivered batch.
fn reissue(entry: &WatchEntry, inner: &mut EntryInner) {
    if inner.read_error.is_some() {
        return;
    }
    let result = match inner.handle.as_mut() {
        Some(handle) => handle.read_changes(),
        None => Err(io::Error::new(io::ErrorKind::NotConnected, "no directory handle")),
    };
    match result {
        Ok(()) => {
            inner.apply(EntryEvent::ReadIssued);
        }
        Err(err) => pin(entry, inner, err),
    }
}

/// Record a read failure; the entry stops delivering until it is stopped.
fn pin(entry: &WatchEntry, inner: &mut EntryInner, err: io::Error) {
    error!(
        entry = entry.id(),
        path = ?entry.path(),
        error = %err,
        "read failed; watch will report no further changes"
    );
    inner.apply(EntryEvent::ReadFailed);
    inner.read_error = Some(err);
}

/// First phase of the close protocol.
fn close(entry: &WatchEntry, inner: &mut EntryInner) {
    inner.pending_old_name = None;
    match inner.handle.take() {
        Some(mut handle) => {
            handle.close();
            inner.apply(EntryEvent::HandleClosed);
            trace!(entry = entry.id(), "handle closed; awaiting confirmation");
        }
        None => {
            // Nothing to confirm.
            inner.apply(EntryEvent::CloseConfirmed);
            inner.reply(Ok(()));
        }
    }
}
