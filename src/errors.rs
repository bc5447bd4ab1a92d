// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// `start_monitor` was pointed at something that is not a directory.
    #[error("path {0:?} is not a directory")]
    NotADirectory(PathBuf),

    /// The directory could not be opened for change notification.
    #[error("failed to open folder {path:?} for monitoring: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The notification source refused to register the directory.
    #[error("failed to register folder {path:?} with the notification source: {source}")]
    RegisterFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The first asynchronous read could not be issued.
    #[error("failed to start monitoring folder {path:?}: read request failed: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn the folder monitor worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The worker thread went away while a caller was waiting on it.
    #[error("folder monitor worker exited before acknowledging the request for {0:?}")]
    WorkerGone(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MonitorError>;
