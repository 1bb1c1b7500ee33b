//! Node configuration: operating mode, listen address, hop count, and the
//! exit-port allowlist. TOML, with a `#[serde(default)]` field for every
//! entry so a partial config file still loads.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_settings_path, Result, SettingsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub mode: NodeMode,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_socks5_addr")]
    pub socks5_listen_addr: String,

    #[serde(default = "default_hops")]
    pub default_hops: u8,

    #[serde(default = "default_identity_path")]
    pub identity_path: String,

    #[serde(default = "default_network_map_path")]
    pub network_map_path: String,

    /// Local ports this node will dial into on behalf of a tunnel when
    /// acting as the exit hop. Empty means exit mode is disabled.
    #[serde(default)]
    pub allowed_exit_ports: Vec<u16>,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/9000".to_string()
}

fn default_socks5_addr() -> String {
    "127.0.0.1:9050".to_string()
}

fn default_hops() -> u8 {
    onionmesh_core::DEFAULT_NUM_HOPS as u8
}

fn default_identity_path() -> String {
    "identity.bin".to_string()
}

fn default_network_map_path() -> String {
    "network-map.toml".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mode: NodeMode::default(),
            listen_addr: default_listen_addr(),
            socks5_listen_addr: default_socks5_addr(),
            default_hops: default_hops(),
            identity_path: default_identity_path(),
            network_map_path: default_network_map_path(),
            allowed_exit_ports: Vec::new(),
            config_path: None,
        }
    }
}

impl NodeConfig {
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut config: NodeConfig =
                toml::from_str(&content).map_err(SettingsError::ParseError)?;
            config.config_path = Some(path.to_path_buf());
            info!(path = %path.display(), "loaded node config");
            Ok(config)
        } else {
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }
        let content = toml::to_string_pretty(self).map_err(SettingsError::SerializeError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!(path = %path.display(), "saved node config");
        Ok(())
    }
}

/// Node operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Originate tunnels only; never accept relay connections.
    #[default]
    Client,
    /// Forward traffic for others; never originates tunnels itself.
    Relay,
    /// Relay plus willing to act as the exit hop for `allowed_exit_ports`.
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.mode, NodeMode::Client);
        assert_eq!(config.default_hops, onionmesh_core::DEFAULT_NUM_HOPS as u8);
        assert!(config.allowed_exit_ports.is_empty());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = NodeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.mode, config.mode);
        assert_eq!(parsed.default_hops, config.default_hops);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: NodeConfig = toml::from_str("mode = \"full\"\n").unwrap();
        assert_eq!(parsed.mode, NodeMode::Full);
        assert_eq!(parsed.listen_addr, default_listen_addr());
    }
}
