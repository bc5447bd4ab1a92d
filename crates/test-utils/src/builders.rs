#![allow(dead_code)]

use std::path::{Path, PathBuf};

use foldermon::config::{ConfigFile, ConfigSection, RawConfigFile, WatchConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                watch: Vec::new(),
            },
        }
    }

    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.config.watch.push(watch);
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.config.poll_interval_ms = ms;
        self
    }

    pub fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.config.config.read_buffer_size = bytes;
        self
    }

    pub fn with_ignore_hidden(mut self, val: bool) -> Self {
        self.config.config.ignore_hidden = val;
        self
    }

    /// The unvalidated model, for tests of validation itself.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WatchConfig`.
pub struct WatchConfigBuilder {
    watch: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            watch: WatchConfig {
                path: PathBuf::from(path.as_ref()),
                recursive: true,
                filter: None,
            },
        }
    }

    pub fn non_recursive(mut self) -> Self {
        self.watch.recursive = false;
        self
    }

    pub fn filter(mut self, names: &[&str]) -> Self {
        self.watch.filter = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> WatchConfig {
        self.watch
    }
}
