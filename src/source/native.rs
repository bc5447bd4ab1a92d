// src/source/native.rs

//! Notification source backed by `notify`.
//!
//! Each open directory owns its own `RecommendedWatcher`. The watcher callback
//! classifies events against the entry's [`ChangeFilter`] and parks the
//! resulting records in an inbox. When a read is outstanding the inbox is
//! flushed into one batch (at most `buffer_size` bytes) and posted to the
//! completion port; otherwise records wait for the next read.
//!
//! Rename halves are paired by their tracker. An old half is held back until
//! its new half arrives; if another event comes first, or nothing arrives
//! within [`RENAME_PAIR_WINDOW`], the file left the tree and is reported as
//! removed. A new half with no matching old half is reported as added.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use notify::event::{
    AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind,
    RenameMode,
};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use crate::errors::{MonitorError, Result};
use crate::source::record::{encoded_len, RawChangeKind, RecordBatch};
use crate::source::{
    CompletionPort, CompletionStatus, DirHandle, EntryId, NotificationSource, WatchRequest,
};
use crate::types::ChangeFilter;

/// How long an old rename half waits for its new half.
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(50);

/// Production notification source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSource;

impl NotificationSource for NativeSource {
    fn open(&self, request: WatchRequest<'_>, port: CompletionPort) -> Result<Box<dyn DirHandle>> {
        let path = request.path;

        // Surface permission / not-found problems as plain I/O errors before
        // handing the path to notify.
        std::fs::read_dir(path).map_err(|source| MonitorError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let inbox = Arc::new(Inbox {
            id: request.id,
            root: path.to_path_buf(),
            filter: request.filter,
            buffer_size: request.buffer_size,
            port,
            state: Mutex::new(InboxState::default()),
        });

        let mut watcher = RecommendedWatcher::new(
            {
                let inbox = Arc::clone(&inbox);
                move |res: notify::Result<Event>| inbox.on_event(res)
            },
            Config::default(),
        )
        .map_err(|source| MonitorError::RegisterFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let mode = if request.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path, mode)
            .map_err(|source| MonitorError::RegisterFailed {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(entry = request.id, ?path, filter = %request.filter, "native watch registered");

        Ok(Box::new(NativeHandle {
            inbox,
            watcher: Some(watcher),
        }))
    }
}

/// Open directory backed by a `notify` watcher.
pub struct NativeHandle {
    inbox: Arc<Inbox>,
    watcher: Option<RecommendedWatcher>,
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("entry", &self.inbox.id)
            .field("root", &self.inbox.root)
            .field("open", &self.watcher.is_some())
            .finish()
    }
}

impl DirHandle for NativeHandle {
    fn read_changes(&mut self) -> io::Result<()> {
        let mut state = self.inbox.lock();
        if state.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "directory handle is closed",
            ));
        }
        if state.pending.is_empty() {
            state.read_outstanding = true;
        } else {
            self.inbox.complete_read(&mut state);
        }
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the watcher stops notify's thread from calling back into
        // the inbox; do it before taking the inbox lock.
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        drop(watcher);

        let mut state = self.inbox.lock();
        state.closed = true;
        state.read_outstanding = false;
        state.pending.clear();
        state.held = None;
        drop(state);

        self.inbox
            .port
            .post_entry(self.inbox.id, CompletionStatus::Cancelled);
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Default)]
struct InboxState {
    pending: VecDeque<(RawChangeKind, String)>,
    read_outstanding: bool,
    closed: bool,
    /// Old half of a rename waiting for its new half.
    held: Option<HeldRename>,
    /// Tracker of the last rename reported as a pair.
    last_pair: Option<usize>,
    expiry_running: bool,
}

#[derive(Debug)]
struct HeldRename {
    tracker: Option<usize>,
    path: PathBuf,
    since: Instant,
}

struct Inbox {
    id: EntryId,
    root: PathBuf,
    filter: ChangeFilter,
    buffer_size: usize,
    port: CompletionPort,
    state: Mutex<InboxState>,
}

impl Inbox {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_event(self: &Arc<Self>, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                self.on_error(err);
                return;
            }
        };

        if event.need_rescan() {
            warn!(
                entry = self.id,
                root = ?self.root,
                "notification queue overflowed; some changes were not reported"
            );
        }

        let records = classify(&event, self.filter);
        let tracker = event.tracker();

        let mut state = self.lock();
        if state.closed {
            return;
        }

        match (&event.kind, records.as_slice()) {
            (_, [(RawChangeKind::RenamedOld, from)]) => {
                self.expire_held(&mut state);
                state.held = Some(HeldRename {
                    tracker,
                    path: from.clone(),
                    since: Instant::now(),
                });
                self.schedule_expiry(&mut state);
            }
            (_, [(RawChangeKind::RenamedNew, to)]) => match state.held.take() {
                Some(held) if held.tracker == tracker => {
                    state.last_pair = tracker;
                    self.queue(&mut state, RawChangeKind::RenamedOld, &held.path);
                    self.queue(&mut state, RawChangeKind::RenamedNew, to);
                }
                unmatched => {
                    state.held = unmatched;
                    self.expire_held(&mut state);
                    self.queue(&mut state, RawChangeKind::Added, to);
                }
            },
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), _)
                if tracker.is_some() && tracker == state.last_pair =>
            {
                trace!(entry = self.id, ?tracker, "rename already paired from its halves");
            }
            _ => {
                self.expire_held(&mut state);
                if records.is_empty() {
                    trace!(entry = self.id, kind = ?event.kind, "event filtered out");
                }
                for (kind, path) in &records {
                    self.queue(&mut state, *kind, path);
                }
            }
        }

        if state.read_outstanding && !state.pending.is_empty() {
            self.complete_read(&mut state);
        }
    }

    fn queue(&self, state: &mut InboxState, kind: RawChangeKind, path: &Path) {
        match relative_name(&self.root, path) {
            Some(name) => state.pending.push_back((kind, name)),
            None => trace!(entry = self.id, ?path, "event outside watched root"),
        }
    }

    /// Report a held old half as removed.
    fn expire_held(&self, state: &mut InboxState) {
        if let Some(held) = state.held.take() {
            debug!(entry = self.id, path = ?held.path, "rename left the watched tree");
            self.queue(state, RawChangeKind::Removed, &held.path);
        }
    }

    /// Make sure a held old half is reported even if no further event comes.
    fn schedule_expiry(self: &Arc<Self>, state: &mut InboxState) {
        if state.expiry_running {
            return;
        }
        let inbox = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("foldermon-rename".to_string())
            .spawn(move || inbox.expire_after_window());
        match spawned {
            Ok(_) => state.expiry_running = true,
            Err(err) => {
                warn!(entry = self.id, error = %err, "cannot wait for rename pair");
                self.expire_held(state);
            }
        }
    }

    fn expire_after_window(&self) {
        let mut wait = RENAME_PAIR_WINDOW;
        loop {
            thread::sleep(wait);
            let mut state = self.lock();
            let age = match &state.held {
                Some(held) if !state.closed => held.since.elapsed(),
                _ => {
                    state.expiry_running = false;
                    return;
                }
            };
            if age < RENAME_PAIR_WINDOW {
                wait = RENAME_PAIR_WINDOW - age;
                continue;
            }

            self.expire_held(&mut state);
            state.expiry_running = false;
            if state.read_outstanding && !state.pending.is_empty() {
                self.complete_read(&mut state);
            }
            return;
        }
    }

    fn on_error(&self, err: notify::Error) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        if state.read_outstanding {
            state.read_outstanding = false;
            self.port
                .post_entry(self.id, CompletionStatus::Failed(io::Error::other(err)));
        } else {
            warn!(entry = self.id, root = ?self.root, error = %err, "watch error with no read outstanding");
        }
    }

    /// Move as many pending records as fit into one batch and post it.
    fn complete_read(&self, state: &mut InboxState) {
        let mut batch = RecordBatch::with_capacity(self.buffer_size);

        while let Some((kind, name)) = state.pending.front() {
            let needed = match (kind, state.pending.get(1)) {
                // Never split a rename pair across two reads.
                (RawChangeKind::RenamedOld, Some((RawChangeKind::RenamedNew, new_name))) => {
                    encoded_len(name.len()) + encoded_len(new_name.len())
                }
                _ => encoded_len(name.len()),
            };

            if needed > batch.remaining() {
                if batch.is_empty() && needed > self.buffer_size {
                    warn!(
                        entry = self.id,
                        name = %name,
                        buffer_size = self.buffer_size,
                        "record larger than the read buffer; dropping it"
                    );
                    state.pending.pop_front();
                    continue;
                }
                break;
            }

            if let Some((kind, name)) = state.pending.pop_front() {
                batch.push(kind, &name);
            }
        }

        if batch.is_empty() {
            return;
        }

        trace!(entry = self.id, records = batch.len(), "completing read");
        state.read_outstanding = false;
        self.port
            .post_entry(self.id, CompletionStatus::Filled(batch.into_bytes()));
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Turn one notify event into raw records, keeping only the categories the
/// filter subscribes to.
pub fn classify(event: &Event, filter: ChangeFilter) -> Vec<(RawChangeKind, PathBuf)> {
    let names = ChangeFilter::FILE_NAME | ChangeFilter::DIR_NAME;

    let (kind, required) = match event.kind {
        EventKind::Create(kind) => (RawChangeKind::Added, name_category(kind_is_dir_create(kind))),
        EventKind::Remove(kind) => (RawChangeKind::Removed, name_category(kind_is_dir_remove(kind))),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => (RawChangeKind::RenamedOld, names),
            RenameMode::To => (RawChangeKind::RenamedNew, names),
            RenameMode::Both => {
                if !filter.intersects(names) {
                    return Vec::new();
                }
                return match event.paths.as_slice() {
                    [from, to] => vec![
                        (RawChangeKind::RenamedOld, from.clone()),
                        (RawChangeKind::RenamedNew, to.clone()),
                    ],
                    _ => Vec::new(),
                };
            }
            RenameMode::Any | RenameMode::Other => {
                // Backends that cannot pair renames: report where the entry ended up.
                return event
                    .paths
                    .iter()
                    .filter(|_| filter.intersects(names))
                    .map(|p| {
                        let kind = if p.exists() {
                            RawChangeKind::Added
                        } else {
                            RawChangeKind::Removed
                        };
                        (kind, p.clone())
                    })
                    .collect();
            }
        },
        EventKind::Modify(ModifyKind::Data(change)) => (
            RawChangeKind::Modified,
            match change {
                DataChange::Size => ChangeFilter::SIZE,
                _ => ChangeFilter::SIZE | ChangeFilter::LAST_WRITE,
            },
        ),
        EventKind::Modify(ModifyKind::Metadata(meta)) => (
            RawChangeKind::Modified,
            match meta {
                MetadataKind::WriteTime => ChangeFilter::LAST_WRITE,
                MetadataKind::AccessTime => ChangeFilter::LAST_ACCESS,
                MetadataKind::Permissions | MetadataKind::Ownership => ChangeFilter::SECURITY,
                _ => ChangeFilter::ATTRIBUTES | ChangeFilter::CREATION,
            },
        ),
        EventKind::Modify(ModifyKind::Any | ModifyKind::Other) => {
            (RawChangeKind::Modified, ChangeFilter::LAST_WRITE)
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            (RawChangeKind::Modified, ChangeFilter::LAST_WRITE)
        }
        EventKind::Access(_) => (RawChangeKind::Modified, ChangeFilter::LAST_ACCESS),
        EventKind::Any | EventKind::Other => return Vec::new(),
    };

    if !filter.intersects(required) {
        return Vec::new();
    }
    event.paths.iter().map(|p| (kind, p.clone())).collect()
}

fn name_category(is_dir: Option<bool>) -> ChangeFilter {
    match is_dir {
        Some(true) => ChangeFilter::DIR_NAME,
        Some(false) => ChangeFilter::FILE_NAME,
        None => ChangeFilter::FILE_NAME | ChangeFilter::DIR_NAME,
    }
}

fn kind_is_dir_create(kind: CreateKind) -> Option<bool> {
    match kind {
        CreateKind::Folder => Some(true),
        CreateKind::File => Some(false),
        _ => None,
    }
}

fn kind_is_dir_remove(kind: RemoveKind) -> Option<bool> {
    match kind {
        RemoveKind::Folder => Some(true),
        RemoveKind::File => Some(false),
        _ => None,
    }
}
