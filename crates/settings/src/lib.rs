//! Settings / configuration (§4.9): TOML node config plus the static
//! network map it points at.

mod config;
mod network_map;

pub use config::{NodeConfig, NodeMode};
pub use network_map::load_network_map;

use std::path::PathBuf;

use onionmesh_keystore::default_config_dir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("failed to parse settings: {0}")]
    ParseError(toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    SerializeError(toml::ser::Error),

    #[error("failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("node.toml")
}
