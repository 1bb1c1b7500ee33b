//! Loads the static peer directory from a TOML file.

use std::path::Path;

use onionmesh_core::NetworkMap;

use crate::{Result, SettingsError};

pub fn load_network_map(path: &Path) -> Result<NetworkMap> {
    let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
    toml::from_str(&content).map_err(SettingsError::ParseError)
}
