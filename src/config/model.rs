// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::monitor::{MonitorOptions, DEFAULT_READ_BUFFER_SIZE};
use crate::types::ChangeFilter;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// poll_interval_ms = 100
/// read_buffer_size = 65536
/// ignore_hidden = true
///
/// [[watch]]
/// path = "assets"
/// recursive = true
/// filter = ["file_name", "size", "last_write"]
/// ```
///
/// Every section is optional at this stage; [`ConfigFile`] is the checked form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All `[[watch]]` tables, in file order.
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

impl RawConfigFile {
    /// Make relative watch paths relative to `base` (usually the directory
    /// holding the config file).
    pub fn resolve_relative(mut self, base: &Path) -> Self {
        for watch in &mut self.watch {
            if watch.path.is_relative() {
                watch.path = base.join(&watch.path);
            }
        }
        self
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConfigSection {
    /// Milliseconds between two `update` cycles in the binary.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity, in bytes, of one notification batch.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_true")]
    pub ignore_hidden: bool,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            read_buffer_size: default_read_buffer_size(),
            ignore_hidden: true,
        }
    }
}

/// One `[[watch]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchConfig {
    pub path: PathBuf,

    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Filter category names. `None` means [`ChangeFilter::DEFAULT`].
    #[serde(default)]
    pub filter: Option<Vec<String>>,
}

/// A validated watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    pub path: PathBuf,
    pub recursive: bool,
    pub filter: ChangeFilter,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub watch: Vec<WatchSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, watch: Vec<WatchSpec>) -> Self {
        Self { config, watch }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            read_buffer_size: self.config.read_buffer_size,
            ignore_hidden: self.config.ignore_hidden,
        }
    }
}
