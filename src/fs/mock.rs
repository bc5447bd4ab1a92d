// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(u64),
    Dir,
}

/// In-memory filesystem for tests.
///
/// Only sizes are tracked; that is all the stabiliser looks at. Clones share
/// the same tree, so a test can keep one handle and give another to the
/// monitor.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory, and any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut entries = self.entries.lock().unwrap();
        for dir in path.as_ref().ancestors() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            entries.entry(dir.to_path_buf()).or_insert(MockEntry::Dir);
        }
    }

    /// Create or overwrite a file with the given size. Parents are created
    /// implicitly.
    pub fn set_file(&self, path: impl AsRef<Path>, size: u64) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), MockEntry::File(size));
    }

    /// Grow an existing file, as a writer still appending would.
    pub fn append(&self, path: impl AsRef<Path>, bytes: u64) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(MockEntry::File(size)) = entries.get_mut(path.as_ref()) {
            *size += bytes;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.entries
            .lock()
            .unwrap()
            .retain(|p, _| !p.starts_with(path));
    }

    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.remove(from.as_ref()) {
            entries.insert(to.as_ref().to_path_buf(), entry);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.entries.lock().unwrap().get(path), Some(MockEntry::Dir))
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        match self.entries.lock().unwrap().get(path) {
            Some(MockEntry::File(size)) => Ok(*size),
            Some(MockEntry::Dir) => Ok(0),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Tests use absolute paths; only existence is checked.
        if self.exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }
}
