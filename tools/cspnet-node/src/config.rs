// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node tool configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use cspnet::{Handle, NodeConfig, FIRST_DYNAMIC_HANDLE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one `cspnet-node` process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Link and identity settings handed to the node
    #[serde(default = "default_node")]
    pub node: NodeConfig,

    /// Address to bind the link server to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Link server port (0 picks a free one)
    #[serde(default)]
    pub port: u16,

    /// Handle of the served channel, barrier or connection
    #[serde(default = "default_handle")]
    pub handle: Handle,
}

fn default_node() -> NodeConfig {
    NodeConfig::named("cspnet")
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_handle() -> Handle {
    FIRST_DYNAMIC_HANDLE
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            bind_address: default_bind_address(),
            port: 0,
            handle: default_handle(),
        }
    }
}

impl ToolConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.is_empty() {
            return Err(ConfigError::Invalid("node name is empty".into()));
        }
        if self.node.name.contains(['-', '/']) {
            return Err(ConfigError::Invalid(format!(
                "node name {:?} may not contain '-' or '/'",
                self.node.name
            )));
        }
        if self.handle < 0 {
            return Err(ConfigError::Invalid(format!("negative handle {}", self.handle)));
        }
        if self.node.link_buffer_size == 0 {
            return Err(ConfigError::Invalid("link_buffer_size must be positive".into()));
        }
        Ok(())
    }

    pub fn bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ToolConfig = serde_json::from_str(r#"{"port": 7890}"#).unwrap();
        assert_eq!(config.port, 7890);
        assert_eq!(config.handle, 50);
        assert!(config.bind_address.is_unspecified());
        config.validate().unwrap();
    }

    #[test]
    fn from_file_reads_node_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"node": {{"name": "relay", "tcp_nodelay": false}}, "handle": 60}}"#
        )
        .unwrap();
        let config = ToolConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node.name, "relay");
        assert!(!config.node.tcp_nodelay);
        assert_eq!(config.handle, 60);
    }

    #[test]
    fn dashes_in_name_are_invalid() {
        let mut config = ToolConfig::default();
        config.node.name = "bad-name".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
