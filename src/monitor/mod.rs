// src/monitor/mod.rs

//! Folder monitor: the public API.
//!
//! ```text
//!  owning thread                       worker thread
//!  ─────────────                       ─────────────
//!  start_monitor ──(request + nudge)──▶ Starting → Monitoring
//!        ◀────────────── reply ───────
//!  update ◀── action queue ─────────── parse batch, re-issue read
//!  stop_monitor ───(request + nudge)──▶ Shutdown → Shutdown2 → Inactive
//!        ◀────────────── reply ───────
//! ```
//!
//! `update` drains the queue, runs the stabiliser and invokes callbacks for
//! the actions that settled.

pub mod action;
pub mod entry;
pub mod queue;
pub mod stabilize;
mod worker;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::errors::{MonitorError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::source::{
    CompletionPort, CompletionStatus, EntryId, NativeSource, NotificationSource, WatchRequest,
};
use crate::types::ChangeFilter;

pub use action::{ActionKind, PendingAction};
pub use entry::{EntryEvent, MonitorState, WatchEntry};

use entry::EntryArena;
use queue::{action_queue, ActionReceiver, ActionSender};
use stabilize::Stabilizer;
use worker::Worker;

/// Capacity of one notification batch unless configured otherwise.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Library-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Upper bound, in bytes, on one batch delivered by the source.
    pub read_buffer_size: usize,
    /// Drop changes whose final path component starts with a dot.
    pub ignore_hidden: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            ignore_hidden: true,
        }
    }
}

type PathCallback = Box<dyn FnMut(&Path) + Send>;
type RenameCallback = Box<dyn FnMut(&Path, &Path) + Send>;

#[derive(Default)]
struct Callbacks {
    added: Option<PathCallback>,
    removed: Option<PathCallback>,
    modified: Option<PathCallback>,
    renamed: Option<RenameCallback>,
}

impl Callbacks {
    fn emit(&mut self, action: &PendingAction) {
        let slot = match action.kind {
            ActionKind::Added => &mut self.added,
            ActionKind::Removed => &mut self.removed,
            ActionKind::Modified => &mut self.modified,
            ActionKind::Renamed => {
                if let Some(cb) = self.renamed.as_mut() {
                    cb(action.previous_path(), &action.path);
                }
                return;
            }
        };
        if let Some(cb) = slot.as_mut() {
            cb(&action.path);
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    by_path: HashMap<PathBuf, EntryId>,
    next_id: EntryId,
    worker: Option<Worker>,
}

/// Watches directories and reports settled changes through callbacks.
///
/// `start_monitor` and `stop_monitor` block until the worker thread has
/// acknowledged the transition, so they must not be called from inside an
/// async runtime; use `spawn_blocking` there.
pub struct FolderMonitor {
    registry: Mutex<Registry>,
    arena: EntryArena,
    sender: ActionSender,
    receiver: ActionReceiver,
    stabilizer: Stabilizer,
    callbacks: Mutex<Callbacks>,
    source: Arc<dyn NotificationSource>,
    fs: Arc<dyn FileSystem>,
    options: MonitorOptions,
}

impl fmt::Debug for FolderMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderMonitor")
            .field("watched", &self.watched_paths())
            .field("pending", &self.stabilizer.len())
            .field("source", &self.source)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for FolderMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderMonitor {
    /// Monitor backed by the OS notification source and the real filesystem.
    pub fn new() -> Self {
        Self::with_options(MonitorOptions::default())
    }

    pub fn with_options(options: MonitorOptions) -> Self {
        Self::with_backend(Arc::new(NativeSource), Arc::new(RealFileSystem), options)
    }

    /// Monitor with explicit collaborators; tests plug in fakes here.
    pub fn with_backend(
        source: Arc<dyn NotificationSource>,
        fs: Arc<dyn FileSystem>,
        options: MonitorOptions,
    ) -> Self {
        let (sender, receiver) = action_queue();
        Self {
            registry: Mutex::new(Registry::default()),
            arena: EntryArena::default(),
            sender,
            receiver,
            stabilizer: Stabilizer::new(),
            callbacks: Mutex::new(Callbacks::default()),
            source,
            fs,
            options,
        }
    }

    pub fn options(&self) -> MonitorOptions {
        self.options
    }

    pub fn on_added(&mut self, f: impl FnMut(&Path) + Send + 'static) -> &mut Self {
        self.callbacks_mut().added = Some(Box::new(f));
        self
    }

    pub fn on_removed(&mut self, f: impl FnMut(&Path) + Send + 'static) -> &mut Self {
        self.callbacks_mut().removed = Some(Box::new(f));
        self
    }

    pub fn on_modified(&mut self, f: impl FnMut(&Path) + Send + 'static) -> &mut Self {
        self.callbacks_mut().modified = Some(Box::new(f));
        self
    }

    /// Called with `(old, new)`.
    pub fn on_renamed(&mut self, f: impl FnMut(&Path, &Path) + Send + 'static) -> &mut Self {
        self.callbacks_mut().renamed = Some(Box::new(f));
        self
    }

    /// Start watching `path`.
    ///
    /// Blocks until the worker has issued the first read. Watching a path that
    /// is already watched is a no-op. On failure nothing about the new entry
    /// is left behind.
    pub fn start_monitor(
        &self,
        path: impl AsRef<Path>,
        recursive: bool,
        filter: ChangeFilter,
    ) -> Result<()> {
        let requested = path.as_ref();
        if !self.fs.is_dir(requested) {
            warn!(path = ?requested, "not a directory; watch not started");
            return Err(MonitorError::NotADirectory(requested.to_path_buf()));
        }
        let path = self.fs.canonicalize(requested)?;

        let mut registry = self.lock_registry();
        if registry.by_path.contains_key(&path) {
            warn!(?path, "already watching");
            return Ok(());
        }

        let port = match registry.worker.as_ref() {
            Some(worker) => worker.port(),
            None => {
                let worker = Worker::spawn(
                    self.arena.clone(),
                    self.sender.clone(),
                    self.options.ignore_hidden,
                )?;
                let port = worker.port();
                registry.worker = Some(worker);
                port
            }
        };

        let id = registry.next_id;
        registry.next_id += 1;

        match self.start_entry(id, &path, recursive, filter, port) {
            Ok(()) => {
                info!(?path, recursive, %filter, "watch started");
                registry.by_path.insert(path, id);
                Ok(())
            }
            Err(err) => {
                self.arena.remove(id);
                if registry.by_path.is_empty() {
                    if let Some(worker) = registry.worker.take() {
                        worker.shutdown();
                    }
                }
                warn!(?path, error = %err, "watch failed to start");
                Err(err)
            }
        }
    }

    fn start_entry(
        &self,
        id: EntryId,
        path: &Path,
        recursive: bool,
        filter: ChangeFilter,
        port: CompletionPort,
    ) -> Result<()> {
        let request = WatchRequest {
            id,
            path,
            recursive,
            filter,
            buffer_size: self.options.read_buffer_size,
        };
        let handle = self.source.open(request, port.clone())?;

        let entry = Arc::new(WatchEntry::new(id, path.to_path_buf()));
        let reply = entry
            .request_start(handle)
            .ok_or_else(|| anyhow!("new entry for {:?} was not inactive", path))?;
        self.arena.insert(Arc::clone(&entry));

        if !port.post_entry(id, CompletionStatus::Nudge) {
            abandon(&entry);
            return Err(MonitorError::WorkerGone(path.to_path_buf()));
        }

        reply
            .blocking_recv()
            .map_err(|_| MonitorError::WorkerGone(path.to_path_buf()))?
    }

    /// Stop watching `path`. Unknown paths are ignored.
    ///
    /// Blocks until the worker has closed the directory. Pending actions of
    /// the entry are discarded at the next `update`. The worker thread is
    /// joined once nothing is watched any more.
    pub fn stop_monitor(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = self.resolve(path.as_ref());

        let mut registry = self.lock_registry();
        let Some(id) = registry.by_path.remove(&path) else {
            debug!(?path, "stop requested for unwatched path");
            return Ok(());
        };

        let result = self.stop_entry(registry.worker.as_ref(), id, &path);
        self.arena.remove(id);

        if registry.by_path.is_empty() {
            if let Some(worker) = registry.worker.take() {
                worker.shutdown();
            }
        }

        info!(?path, "watch stopped");
        result
    }

    /// Stop every watch and join the worker. Idempotent.
    ///
    /// Every entry is stopped even if some fail; the first error is returned.
    pub fn stop_monitor_all(&self) -> Result<()> {
        let mut registry = self.lock_registry();
        let entries: Vec<(PathBuf, EntryId)> = registry.by_path.drain().collect();

        let mut first_err = None;
        for (path, id) in entries {
            if let Err(err) = self.stop_entry(registry.worker.as_ref(), id, &path) {
                warn!(?path, error = %err, "watch did not stop cleanly");
                first_err.get_or_insert(err);
            }
            self.arena.remove(id);
        }

        if let Some(worker) = registry.worker.take() {
            worker.shutdown();
            debug!("all watches stopped");
        }
        self.receiver.clear();

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stop_entry(&self, worker: Option<&Worker>, id: EntryId, path: &Path) -> Result<()> {
        let Some(entry) = self.arena.get(id) else {
            return Ok(());
        };

        let (reply, read_error) = entry.request_stop();
        if let Some(err) = read_error {
            warn!(?path, error = %err, "watch had stopped reporting changes after a read failure");
        }
        let Some(reply) = reply else {
            debug!(?path, state = ?entry.state(), "entry not monitoring; nothing to stop");
            return Ok(());
        };

        let posted = worker.is_some_and(|w| w.port().post_entry(id, CompletionStatus::Nudge));
        if !posted {
            abandon(&entry);
            return Err(MonitorError::WorkerGone(path.to_path_buf()));
        }

        reply
            .blocking_recv()
            .map_err(|_| MonitorError::WorkerGone(path.to_path_buf()))?
    }

    /// Drain handed-off actions, sample them and invoke callbacks for those
    /// that settled. Returns the number of callbacks' worth of actions
    /// emitted.
    pub fn update(&mut self) -> usize {
        let mut drained = Vec::new();
        self.receiver.drain_into(&mut drained);
        self.stabilizer.absorb(drained);

        let arena = &self.arena;
        self.stabilizer.retain_entries(|id| arena.contains(id));

        let ready = self.stabilizer.poll(self.fs.as_ref());
        let callbacks = self
            .callbacks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for action in &ready {
            callbacks.emit(action);
        }
        ready.len()
    }

    /// Watched roots, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock_registry().by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        let path = self.resolve(path.as_ref());
        self.lock_registry().by_path.contains_key(&path)
    }

    /// State of the entry watching `path`, if any.
    pub fn watch_state(&self, path: impl AsRef<Path>) -> Option<MonitorState> {
        let path = self.resolve(path.as_ref());
        let id = self.lock_registry().by_path.get(&path).copied()?;
        self.arena.get(id).map(|entry| entry.state())
    }

    pub fn is_worker_running(&self) -> bool {
        self.lock_registry()
            .worker
            .as_ref()
            .is_some_and(Worker::is_running)
    }

    /// Actions handed off by the worker but not drained by `update` yet.
    pub fn queued_actions(&self) -> usize {
        self.receiver.len()
    }

    /// Actions waiting for their target to settle.
    pub fn pending_actions(&self) -> usize {
        self.stabilizer.len()
    }

    fn callbacks_mut(&mut self) -> &mut Callbacks {
        self.callbacks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            warn!("registry lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Registry key for `path`. Falls back to the path as given when it can
    /// no longer be canonicalised (for example because it was deleted).
    fn resolve(&self, path: &Path) -> PathBuf {
        self.fs
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

impl Drop for FolderMonitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop_monitor_all() {
            warn!(error = %err, "failed to stop watches on drop");
        }
    }
}

/// Undo a request the worker will never answer.
fn abandon(entry: &WatchEntry) {
    let mut inner = entry.lock();
    inner.waiter = None;
    if let Some(mut handle) = inner.handle.take() {
        handle.close();
    }
    inner.state = MonitorState::Inactive;
}
