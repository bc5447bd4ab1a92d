#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use foldermon::fs::mock::MockFileSystem;
use foldermon::{event_line, ActionKind, FolderMonitor, MonitorOptions};

pub use foldermon_test_utils::{eventually, init_tracing, wait_until, FakeSource};

/// Collects emitted changes as the lines the binary would print.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn attach(&self, monitor: &mut FolderMonitor) {
        let added = self.clone();
        let removed = self.clone();
        let modified = self.clone();
        let renamed = self.clone();
        monitor
            .on_added(move |p| added.push(event_line(ActionKind::Added, p, None)))
            .on_removed(move |p| removed.push(event_line(ActionKind::Removed, p, None)))
            .on_modified(move |p| modified.push(event_line(ActionKind::Modified, p, None)))
            .on_renamed(move |old, new| {
                renamed.push(event_line(ActionKind::Renamed, new, Some(old)))
            });
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }

    /// Everything recorded so far; clears the recorder.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l == line)
    }
}

/// Monitor wired to a fake source and an in-memory filesystem.
pub fn fake_monitor(source: &FakeSource, fs: &MockFileSystem) -> (FolderMonitor, Recorder) {
    fake_monitor_with(source, fs, MonitorOptions::default())
}

pub fn fake_monitor_with(
    source: &FakeSource,
    fs: &MockFileSystem,
    options: MonitorOptions,
) -> (FolderMonitor, Recorder) {
    let mut monitor =
        FolderMonitor::with_backend(Arc::new(source.clone()), Arc::new(fs.clone()), options);
    let recorder = Recorder::default();
    recorder.attach(&mut monitor);
    (monitor, recorder)
}

/// Wait until the worker has handed off at least `n` actions.
pub fn wait_for_handoff(monitor: &FolderMonitor, n: usize) {
    assert!(
        eventually(|| monitor.queued_actions() >= n),
        "worker handed off {} of {} actions",
        monitor.queued_actions(),
        n
    );
}

pub fn line(kind: &str, path: impl AsRef<Path>) -> String {
    format!("{kind} {}", path.as_ref().display())
}
