//! Cross-platform default directories for identity and config files.

use std::path::PathBuf;

pub fn default_keystore_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onionmesh")
        .join("keys")
}

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onionmesh")
}
