// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// File name looked for in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "Foldermon.toml";

/// Read and deserialise a config file. No semantic checks are made here; use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a config file, resolve relative watch paths against the file's
/// directory and validate the result.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?.resolve_relative(&config_dir(path));
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Directory relative watch paths are resolved against.
///
/// A bare file name such as `Foldermon.toml` has an empty parent; the working
/// directory is used then.
pub fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MonitorError;

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foldermon.toml");
        fs::write(
            &path,
            r#"
[[watch]]
path = "assets"

[[watch]]
path = "/abs/logs"
recursive = false
"#,
        )
        .unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.watch[0].path, dir.path().join("assets"));
        assert_eq!(cfg.watch[1].path, PathBuf::from("/abs/logs"));
        assert!(!cfg.watch[1].recursive);
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[[watch]\npath = 1").unwrap();
        assert!(matches!(load_from_path(&path), Err(MonitorError::TomlError(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_and_validate(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(MonitorError::IoError(_))));
    }
}
