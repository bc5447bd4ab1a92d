// src/source/mod.rs

//! Asynchronous directory-change sources.
//!
//! A [`NotificationSource`] opens a directory for change notification and
//! hands back a [`DirHandle`]. Reads issued on the handle never block: each one
//! completes later by posting a [`Completion`] to the [`CompletionPort`] the
//! handle was opened with. The monitor's worker thread is the only consumer of
//! that port.
//!
//! - [`record`] defines the batch wire format and its parser.
//! - [`native`] is the production source built on `notify`.
//!
//! Tests plug in their own source (see `foldermon-test-utils`).

use std::fmt::Debug;
use std::io;
use std::path::Path;

use tokio::sync::mpsc;

use crate::errors::Result;
use crate::types::ChangeFilter;

pub mod native;
pub mod record;

pub use native::NativeSource;
pub use record::{ChangeRecords, RawChangeEvent, RawChangeKind, RecordBatch};

/// Stable identifier of a watch entry.
///
/// Completions carry this instead of a reference to the entry, so a completion
/// that arrives after its entry was removed is simply dropped.
pub type EntryId = u64;

/// Outcome delivered for one entry.
#[derive(Debug)]
pub enum CompletionStatus {
    /// Synthetic wake-up posted by the owning thread; no I/O completed.
    Nudge,
    /// A read completed with a batch of records.
    Filled(Vec<u8>),
    /// The handle was closed. Always posted exactly once per close.
    Cancelled,
    /// The outstanding read failed.
    Failed(io::Error),
}

/// Message taken off the completion port by the worker.
#[derive(Debug)]
pub enum Completion {
    Entry { id: EntryId, status: CompletionStatus },
    /// Wake the worker and make it exit.
    Shutdown,
}

/// Producer side of the completion port. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompletionPort {
    tx: mpsc::UnboundedSender<Completion>,
}

impl CompletionPort {
    /// Post a completion. Returns `false` if the worker is gone.
    pub fn post(&self, completion: Completion) -> bool {
        self.tx.send(completion).is_ok()
    }

    pub fn post_entry(&self, id: EntryId, status: CompletionStatus) -> bool {
        self.post(Completion::Entry { id, status })
    }
}

/// Consumer side of the completion port.
#[derive(Debug)]
pub struct CompletionQueue {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl CompletionQueue {
    /// Block until the next completion arrives.
    ///
    /// Returns `None` once every [`CompletionPort`] has been dropped. Must not
    /// be called from inside an async context.
    pub fn wait(&mut self) -> Option<Completion> {
        self.rx.blocking_recv()
    }
}

pub fn completion_port() -> (CompletionPort, CompletionQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionPort { tx }, CompletionQueue { rx })
}

/// Everything a source needs to open one directory.
#[derive(Debug, Clone, Copy)]
pub struct WatchRequest<'a> {
    pub id: EntryId,
    pub path: &'a Path,
    pub recursive: bool,
    pub filter: ChangeFilter,
    /// Upper bound, in bytes, on the batch delivered by one read.
    pub buffer_size: usize,
}

/// Opens directories for change notification.
pub trait NotificationSource: Send + Sync + Debug {
    /// Open `request.path` and associate it with `port`.
    ///
    /// Fails with [`MonitorError::OpenFailed`](crate::errors::MonitorError::OpenFailed)
    /// or [`MonitorError::RegisterFailed`](crate::errors::MonitorError::RegisterFailed).
    fn open(&self, request: WatchRequest<'_>, port: CompletionPort) -> Result<Box<dyn DirHandle>>;
}

/// An open directory, exclusively owned by one watch entry.
pub trait DirHandle: Send + Debug {
    /// Issue a non-blocking read. The result arrives later as
    /// [`CompletionStatus::Filled`] or [`CompletionStatus::Failed`].
    fn read_changes(&mut self) -> io::Result<()>;

    /// Release the directory. Posts [`CompletionStatus::Cancelled`] once the
    /// source has stopped delivering for this handle. Closing twice is a no-op.
    fn close(&mut self);
}
