// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, WatchConfig, WatchSpec};
use crate::errors::{MonitorError, Result};
use crate::types::ChangeFilter;

pub const MIN_READ_BUFFER_SIZE: usize = 4 * 1024;
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = MonitorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_watches(&raw)?;
        validate_global_config(&raw.config)?;
        ensure_unique_paths(&raw.watch)?;

        let watch = raw
            .watch
            .into_iter()
            .map(validate_watch)
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigFile::new_unchecked(raw.config, watch))
    }
}

fn ensure_has_watches(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.is_empty() {
        return Err(MonitorError::ConfigError(
            "config must contain at least one [[watch]] table".to_string(),
        ));
    }
    Ok(())
}

/// Checks on the `[config]` section alone.
pub fn validate_global_config(config: &ConfigSection) -> Result<()> {
    if config.poll_interval_ms == 0 {
        return Err(MonitorError::ConfigError(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    let size = config.read_buffer_size;
    if !(MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&size) {
        return Err(MonitorError::ConfigError(format!(
            "[config].read_buffer_size must be between {} and {} bytes (got {})",
            MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE, size
        )));
    }

    Ok(())
}

fn ensure_unique_paths(watches: &[WatchConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for watch in watches {
        if !seen.insert(&watch.path) {
            return Err(MonitorError::ConfigError(format!(
                "folder {:?} is listed in more than one [[watch]] table",
                watch.path
            )));
        }
    }
    Ok(())
}

fn validate_watch(watch: WatchConfig) -> Result<WatchSpec> {
    if watch.path.as_os_str().is_empty() {
        return Err(MonitorError::ConfigError(
            "[[watch]] path must not be empty".to_string(),
        ));
    }

    let filter = match watch.filter {
        None => ChangeFilter::DEFAULT,
        Some(names) => parse_filter(&names).map_err(|msg| {
            MonitorError::ConfigError(format!("[[watch]] {:?}: {msg}", watch.path))
        })?,
    };

    Ok(WatchSpec {
        path: watch.path,
        recursive: watch.recursive,
        filter,
    })
}

/// Parse a list of filter names; an empty list is rejected.
pub fn parse_filter<S: AsRef<str>>(names: &[S]) -> std::result::Result<ChangeFilter, String> {
    if names.is_empty() {
        return Err("filter must name at least one change category".to_string());
    }
    ChangeFilter::from_names(names)
}
