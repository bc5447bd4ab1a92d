// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `foldermon`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "foldermon",
    version,
    about = "Watch folders and print file changes once they have settled.",
    long_about = None
)]
pub struct CliArgs {
    /// Folders to watch. When given, they replace the config file's
    /// `[[watch]]` tables.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Foldermon.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Watch only the top level of each folder.
    #[arg(long)]
    pub non_recursive: bool,

    /// Comma-separated change categories, e.g. `file_name,size`, or `all`.
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub filter: Option<Vec<String>>,

    /// Milliseconds between two update cycles.
    #[arg(long, value_name = "N")]
    pub poll_interval_ms: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FOLDERMON_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration, print the resolved watches and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_overrides() {
        let args = CliArgs::try_parse_from([
            "foldermon",
            "in",
            "out",
            "--non-recursive",
            "--filter",
            "file_name,size",
            "--poll-interval-ms",
            "250",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.paths, [PathBuf::from("in"), PathBuf::from("out")]);
        assert!(args.non_recursive);
        assert_eq!(
            args.filter.as_deref(),
            Some(&["file_name".to_string(), "size".to_string()][..])
        );
        assert_eq!(args.poll_interval_ms, Some(250));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(args.config.is_none());
    }

    #[test]
    fn rejects_unknown_log_level() {
        assert!(CliArgs::try_parse_from(["foldermon", "--log-level", "loud"]).is_err());
    }
}
