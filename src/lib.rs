// src/lib.rs

//! Folder change monitoring.
//!
//! [`FolderMonitor`] watches directories on a background worker thread and
//! reports changes through callbacks once the affected file has stopped
//! growing. The rest of the crate is the `foldermon` binary built on top.

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod monitor;
pub mod source;
pub mod types;

pub use errors::{MonitorError, Result};
pub use monitor::{ActionKind, FolderMonitor, MonitorOptions, MonitorState};
pub use types::ChangeFilter;

use std::fmt::Write as _;
use std::path::Path;
use std::thread;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{config_dir, default_config_path, DEFAULT_CONFIG_FILE};
use crate::config::model::{ConfigFile, RawConfigFile, WatchConfig};

/// High-level entry point used by `main.rs`.
///
/// Resolves the configuration, then runs the monitor on a blocking thread
/// until Ctrl-C.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print!("{}", describe(&cfg));
        debug!("dry-run complete (nothing watched)");
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    // Ctrl-C → graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("shutdown requested");
        let _ = stop_tx.send(true);
    });

    tokio::task::spawn_blocking(move || monitor_loop(&cfg, stop_rx))
        .await
        .context("monitor thread panicked")?
}

/// Merge the config file (if any) with command-line overrides and validate.
pub fn resolve_config(args: &CliArgs) -> anyhow::Result<ConfigFile> {
    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => Some(default_config_path()).filter(|path| path.is_file()),
    };

    let mut raw = match &config_path {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("loading config {:?}", path))?
            .resolve_relative(&config_dir(path)),
        None => RawConfigFile::default(),
    };

    if !args.paths.is_empty() {
        raw.watch = args
            .paths
            .iter()
            .map(|path| WatchConfig {
                path: path.clone(),
                recursive: true,
                filter: None,
            })
            .collect();
    }

    for watch in &mut raw.watch {
        if args.non_recursive {
            watch.recursive = false;
        }
        if let Some(filter) = &args.filter {
            watch.filter = Some(filter.clone());
        }
    }

    if let Some(ms) = args.poll_interval_ms {
        raw.config.poll_interval_ms = ms;
    }

    if raw.watch.is_empty() {
        bail!(
            "nothing to watch: pass folders on the command line or add [[watch]] tables to {}",
            DEFAULT_CONFIG_FILE
        );
    }

    Ok(ConfigFile::try_from(raw)?)
}

/// Start every configured watch, run `update` until `stop` flips, then stop
/// everything.
pub fn monitor_loop(cfg: &ConfigFile, stop: watch::Receiver<bool>) -> anyhow::Result<()> {
    let mut monitor = FolderMonitor::with_options(cfg.monitor_options());
    monitor
        .on_added(|path| println!("{}", event_line(ActionKind::Added, path, None)))
        .on_removed(|path| println!("{}", event_line(ActionKind::Removed, path, None)))
        .on_modified(|path| println!("{}", event_line(ActionKind::Modified, path, None)))
        .on_renamed(|old, new| println!("{}", event_line(ActionKind::Renamed, new, Some(old))));

    let mut started = 0;
    for spec in &cfg.watch {
        match monitor.start_monitor(&spec.path, spec.recursive, spec.filter) {
            Ok(()) => started += 1,
            Err(err) => warn!(path = ?spec.path, error = %err, "skipping folder"),
        }
    }
    if started == 0 {
        bail!("none of the {} configured folders could be watched", cfg.watch.len());
    }
    info!(started, "watching; press Ctrl-C to stop");

    let interval = cfg.poll_interval();
    while !*stop.borrow() {
        monitor.update();
        thread::sleep(interval);
    }

    monitor.stop_monitor_all()?;
    Ok(())
}

/// Line printed to stdout for one emitted change.
pub fn event_line(kind: ActionKind, path: &Path, old: Option<&Path>) -> String {
    match (kind, old) {
        (ActionKind::Renamed, Some(old)) => {
            format!("renamed {} -> {}", old.display(), path.display())
        }
        (ActionKind::Added, _) => format!("added {}", path.display()),
        (ActionKind::Removed, _) => format!("removed {}", path.display()),
        (ActionKind::Modified, _) => format!("modified {}", path.display()),
        (ActionKind::Renamed, None) => format!("renamed ? -> {}", path.display()),
    }
}

/// Dry-run summary of the resolved configuration.
pub fn describe(cfg: &ConfigFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "foldermon dry-run");
    let _ = writeln!(out, "  config.poll_interval_ms = {}", cfg.config.poll_interval_ms);
    let _ = writeln!(out, "  config.read_buffer_size = {}", cfg.config.read_buffer_size);
    let _ = writeln!(out, "  config.ignore_hidden = {}", cfg.config.ignore_hidden);
    let _ = writeln!(out);

    let _ = writeln!(out, "watches ({}):", cfg.watch.len());
    for spec in &cfg.watch {
        let _ = writeln!(out, "  - {}", spec.path.display());
        let _ = writeln!(out, "      recursive: {}", spec.recursive);
        let _ = writeln!(out, "      filter: {}", spec.filter);
    }
    out
}
