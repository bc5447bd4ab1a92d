// src/config/mod.rs

//! Configuration for the `foldermon` binary.
//!
//! - `model.rs`: the TOML data model, raw and validated.
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: turning the raw model into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, WatchConfig, WatchSpec};
pub use validate::{parse_filter, validate_global_config};
