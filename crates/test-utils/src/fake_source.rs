use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use foldermon::errors::{MonitorError, Result};
use foldermon::source::{
    CompletionPort, CompletionStatus, DirHandle, EntryId, NotificationSource, RawChangeKind,
    RecordBatch, WatchRequest,
};

/// A scriptable notification source.
///
/// Tests open directories through the monitor as usual and then push batches
/// with [`FakeSource::deliver_records`]. A batch is completed as soon as a
/// read is outstanding; until then it waits, exactly like a kernel buffer.
/// Clones share state, so keep one and hand another to the monitor.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    dirs: HashMap<PathBuf, FakeDir>,
    fail_open: HashSet<PathBuf>,
    fail_reads: HashSet<PathBuf>,
    opened: usize,
    closed: usize,
}

#[derive(Debug)]
struct FakeDir {
    id: EntryId,
    port: CompletionPort,
    pending: VecDeque<Vec<u8>>,
    read_outstanding: bool,
    closed: bool,
    buffer_size: usize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` of `root` fail.
    pub fn fail_open(&self, root: impl AsRef<Path>) {
        self.state
            .lock()
            .unwrap()
            .fail_open
            .insert(root.as_ref().to_path_buf());
    }

    /// Make every read on `root` fail from now on. A read already outstanding
    /// completes with an error.
    pub fn fail_reads(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let mut state = self.state.lock().unwrap();
        state.fail_reads.insert(root.to_path_buf());
        if let Some(dir) = state.dirs.get_mut(root) {
            if dir.read_outstanding && !dir.closed {
                dir.read_outstanding = false;
                dir.port.post_entry(
                    dir.id,
                    CompletionStatus::Failed(io::Error::other("injected read failure")),
                );
            }
        }
    }

    /// Hand a raw batch to the watch on `root`. Returns `false` if `root` is
    /// not open.
    pub fn deliver(&self, root: impl AsRef<Path>, bytes: Vec<u8>) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(dir) = state.dirs.get_mut(root.as_ref()) else {
            return false;
        };
        if dir.closed {
            return false;
        }
        if dir.read_outstanding {
            dir.read_outstanding = false;
            dir.port.post_entry(dir.id, CompletionStatus::Filled(bytes));
        } else {
            dir.pending.push_back(bytes);
        }
        true
    }

    /// Encode `records` (names relative to `root`) into one batch and deliver it.
    pub fn deliver_records(&self, root: impl AsRef<Path>, records: &[(RawChangeKind, &str)]) -> bool {
        let root = root.as_ref();
        let capacity = self
            .state
            .lock()
            .unwrap()
            .dirs
            .get(root)
            .map_or(64 * 1024, |dir| dir.buffer_size);

        let mut batch = RecordBatch::with_capacity(capacity);
        for (kind, name) in records {
            assert!(batch.push(*kind, name), "records do not fit in one batch");
        }
        self.deliver(root, batch.into_bytes())
    }

    /// Directories currently open.
    pub fn open_handles(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .dirs
            .values()
            .filter(|dir| !dir.closed)
            .count()
    }

    pub fn is_open(&self, root: impl AsRef<Path>) -> bool {
        self.state
            .lock()
            .unwrap()
            .dirs
            .get(root.as_ref())
            .is_some_and(|dir| !dir.closed)
    }

    /// `(opened, closed)` counters over the lifetime of the source.
    pub fn counters(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.opened, state.closed)
    }
}

impl NotificationSource for FakeSource {
    fn open(&self, request: WatchRequest<'_>, port: CompletionPort) -> Result<Box<dyn DirHandle>> {
        let root = request.path.to_path_buf();
        let mut state = self.state.lock().unwrap();

        if state.fail_open.remove(&root) {
            return Err(MonitorError::OpenFailed {
                path: root,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "injected open failure"),
            });
        }

        state.dirs.insert(
            root.clone(),
            FakeDir {
                id: request.id,
                port,
                pending: VecDeque::new(),
                read_outstanding: false,
                closed: false,
                buffer_size: request.buffer_size,
            },
        );
        state.opened += 1;

        Ok(Box::new(FakeHandle {
            source: self.clone(),
            root,
        }))
    }
}

#[derive(Debug)]
struct FakeHandle {
    source: FakeSource,
    root: PathBuf,
}

impl DirHandle for FakeHandle {
    fn read_changes(&mut self) -> io::Result<()> {
        let mut state = self.source.state.lock().unwrap();
        let failing = state.fail_reads.contains(&self.root);
        let dir = state
            .dirs
            .get_mut(&self.root)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown directory"))?;

        if dir.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "handle closed"));
        }
        if failing {
            return Err(io::Error::other("injected read failure"));
        }

        match dir.pending.pop_front() {
            Some(bytes) => {
                dir.port.post_entry(dir.id, CompletionStatus::Filled(bytes));
            }
            None => dir.read_outstanding = true,
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.source.state.lock().unwrap();
        let Some(dir) = state.dirs.get_mut(&self.root) else {
            return;
        };
        if dir.closed {
            return;
        }
        dir.closed = true;
        dir.read_outstanding = false;
        dir.pending.clear();
        dir.port.post_entry(dir.id, CompletionStatus::Cancelled);
        state.closed += 1;
    }
}
