// src/monitor/entry.rs

//! Per-directory watch state.
//!
//! A [`WatchEntry`] moves through
//! `Inactive → Starting → Monitoring → Shutdown → Shutdown2 → Inactive`.
//! Only the worker thread advances it, except that the owning thread may
//! request `Starting` (from `Inactive`) or `Shutdown` (from `Monitoring`).
//! A request carries a one-shot reply channel; the worker answers it when
//! the entry settles in `Monitoring` or `Inactive`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::trace;

use crate::errors::Result;
use crate::source::{DirHandle, EntryId};

/// Lifecycle state of a watch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    Inactive,
    Starting,
    Monitoring,
    Shutdown,
    Shutdown2,
}

/// Things that happen to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryEvent {
    /// Owning thread asked to start watching.
    StartRequested,
    /// Worker issued an asynchronous read.
    ReadIssued,
    /// Worker failed to issue a read.
    ReadFailed,
    /// Owning thread asked to stop watching.
    StopRequested,
    /// Worker closed the directory handle.
    HandleClosed,
    /// The source confirmed the handle is gone.
    CloseConfirmed,
}

impl MonitorState {
    pub const ALL: [MonitorState; 5] = [
        MonitorState::Inactive,
        MonitorState::Starting,
        MonitorState::Monitoring,
        MonitorState::Shutdown,
        MonitorState::Shutdown2,
    ];

    /// Transition table. Pairs not listed leave the state unchanged.
    pub fn next(self, event: EntryEvent) -> MonitorState {
        use EntryEvent as E;
        use MonitorState as S;

        match (self, event) {
            (S::Inactive, E::StartRequested) => S::Starting,
            (S::Starting, E::ReadIssued) => S::Monitoring,
            (S::Starting, E::ReadFailed) => S::Inactive,
            // A failed re-issue pins the entry; it stays put until stopped.
            (S::Monitoring, E::ReadIssued | E::ReadFailed) => S::Monitoring,
            (S::Monitoring, E::StopRequested) => S::Shutdown,
            (S::Shutdown, E::HandleClosed) => S::Shutdown2,
            (S::Shutdown, E::CloseConfirmed) => S::Inactive,
            (S::Shutdown2, E::HandleClosed) => S::Shutdown2,
            (S::Shutdown2, E::CloseConfirmed) => S::Inactive,
            (state, _) => state,
        }
    }

    /// Whether an entry in this state owns an open handle.
    pub fn holds_handle(self) -> bool {
        !matches!(self, MonitorState::Inactive | MonitorState::Shutdown2)
    }
}

pub(crate) type Reply = oneshot::Sender<Result<()>>;

/// State shared between the owning thread and the worker.
#[derive(Debug)]
pub(crate) struct EntryInner {
    pub state: MonitorState,
    pub handle: Option<Box<dyn DirHandle>>,
    /// Last read failure while monitoring; the entry delivers nothing after it.
    pub read_error: Option<io::Error>,
    /// Old half of a rename, waiting for its new half.
    pub pending_old_name: Option<PathBuf>,
    /// Caller blocked on the current start/stop request.
    pub waiter: Option<Reply>,
}

impl EntryInner {
    pub fn apply(&mut self, event: EntryEvent) -> MonitorState {
        let next = self.state.next(event);
        if next != self.state {
            trace!(from = ?self.state, to = ?next, ?event, "entry transition");
        }
        self.state = next;
        debug_assert_eq!(
            self.handle.is_some(),
            next.holds_handle(),
            "handle ownership out of step with {next:?}"
        );
        next
    }

    /// Answer the caller waiting on this entry, if any.
    pub fn reply(&mut self, result: Result<()>) {
        if let Some(waiter) = self.waiter.take() {
            // The caller only goes away if its thread panicked.
            let _ = waiter.send(result);
        }
    }
}

/// One monitored directory root.
#[derive(Debug)]
pub struct WatchEntry {
    id: EntryId,
    path: PathBuf,
    inner: Mutex<EntryInner>,
}

impl WatchEntry {
    pub fn new(id: EntryId, path: PathBuf) -> Self {
        Self {
            id,
            path,
            inner: Mutex::new(EntryInner {
                state: MonitorState::Inactive,
                handle: None,
                read_error: None,
                pending_old_name: None,
                waiter: None,
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> MonitorState {
        self.lock().state
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the opened directory to the entry and ask the worker to start it.
    ///
    /// Returns `None` if the entry is not `Inactive`.
    pub(crate) fn request_start(
        &self,
        handle: Box<dyn DirHandle>,
    ) -> Option<oneshot::Receiver<Result<()>>> {
        let mut inner = self.lock();
        if inner.state != MonitorState::Inactive {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        inner.handle = Some(handle);
        inner.read_error = None;
        inner.waiter = Some(tx);
        inner.apply(EntryEvent::StartRequested);
        Some(rx)
    }

    /// Ask the worker to shut the entry down.
    ///
    /// Returns `None` if the entry is not `Monitoring`. Any read error the
    /// entry was pinned with is handed back so the caller can report it.
    pub(crate) fn request_stop(
        &self,
    ) -> (Option<oneshot::Receiver<Result<()>>>, Option<io::Error>) {
        let mut inner = self.lock();
        let read_error = inner.read_error.take();
        if inner.state != MonitorState::Monitoring {
            return (None, read_error);
        }
        let (tx, rx) = oneshot::channel();
        inner.waiter = Some(tx);
        inner.apply(EntryEvent::StopRequested);
        (Some(rx), read_error)
    }
}

/// Entries addressable by id, shared with the worker thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntryArena {
    slots: Arc<Mutex<HashMap<EntryId, Arc<WatchEntry>>>>,
}

impl EntryArena {
    fn lock(&self) -> MutexGuard<'_, HashMap<EntryId, Arc<WatchEntry>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, entry: Arc<WatchEntry>) {
        self.lock().insert(entry.id(), entry);
    }

    pub fn get(&self, id: EntryId) -> Option<Arc<WatchEntry>> {
        self.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: EntryId) -> Option<Arc<WatchEntry>> {
        self.lock().remove(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.lock().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntryEvent as E;
    use MonitorState as S;

    const EVENTS: [EntryEvent; 6] = [
        E::StartRequested,
        E::ReadIssued,
        E::ReadFailed,
        E::StopRequested,
        E::HandleClosed,
        E::CloseConfirmed,
    ];

    fn expected(state: MonitorState, event: EntryEvent) -> MonitorState {
        match (state, event) {
            (S::Inactive, E::StartRequested) => S::Starting,
            (S::Starting, E::ReadIssued) => S::Monitoring,
            (S::Starting, E::ReadFailed) => S::Inactive,
            (S::Monitoring, E::StopRequested) => S::Shutdown,
            (S::Shutdown, E::HandleClosed) => S::Shutdown2,
            (S::Shutdown, E::CloseConfirmed) => S::Inactive,
            (S::Shutdown2, E::CloseConfirmed) => S::Inactive,
            (state, _) => state,
        }
    }

    #[test]
    fn transition_table_covers_every_pair() {
        let mut checked = 0;
        for state in S::ALL {
            for event in EVENTS {
                assert_eq!(
                    state.next(event),
                    expected(state, event),
                    "{state:?} + {event:?}"
                );
                checked += 1;
            }
        }
        assert_eq!(checked, 30);
    }

    #[test]
    fn shutdown2_reentry_is_idempotent() {
        let state = S::Shutdown2.next(E::HandleClosed).next(E::HandleClosed);
        assert_eq!(state, S::Shutdown2);
        assert_eq!(state.next(E::CloseConfirmed), S::Inactive);
        assert_eq!(S::Inactive.next(E::CloseConfirmed), S::Inactive);
    }

    #[test]
    fn full_lifecycle_returns_to_inactive() {
        let path = [
            E::StartRequested,
            E::ReadIssued,
            E::ReadIssued,
            E::StopRequested,
            E::HandleClosed,
            E::CloseConfirmed,
        ];
        let end = path.iter().fold(S::Inactive, |state, event| state.next(*event));
        assert_eq!(end, S::Inactive);
    }

    #[test]
    fn handle_ownership_by_state() {
        assert!(!S::Inactive.holds_handle());
        assert!(S::Starting.holds_handle());
        assert!(S::Monitoring.holds_handle());
        assert!(S::Shutdown.holds_handle());
        assert!(!S::Shutdown2.holds_handle());
    }

    #[derive(Debug)]
    struct NullHandle;

    impl DirHandle for NullHandle {
        fn read_changes(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    #[test]
    fn requests_only_fire_from_the_right_state() {
        let entry = WatchEntry::new(1, PathBuf::from("/w"));

        let (stop, _) = entry.request_stop();
        assert!(stop.is_none());

        assert!(entry.request_start(Box::new(NullHandle)).is_some());
        assert_eq!(entry.state(), S::Starting);
        assert!(entry.request_start(Box::new(NullHandle)).is_none());

        entry.lock().apply(E::ReadIssued);
        let (stop, err) = entry.request_stop();
        assert!(stop.is_some());
        assert!(err.is_none());
        assert_eq!(entry.state(), S::Shutdown);
    }

    #[test]
    fn arena_forgets_removed_entries() {
        let arena = EntryArena::default();
        arena.insert(Arc::new(WatchEntry::new(3, PathBuf::from("/w"))));
        assert!(arena.contains(3));
        assert_eq!(arena.get(3).unwrap().path(), Path::new("/w"));
        assert!(arena.remove(3).is_some());
        assert!(arena.get(3).is_none());
    }
}
