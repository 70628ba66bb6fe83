// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node configuration.
//!
//! Compile-time defaults live in the constants below; [`NodeConfig`] carries
//! the values a running node actually uses.

use std::time::Duration;

/// Stream buffer size for link I/O (bytes).
pub const DEFAULT_LINK_BUFFER_SIZE: usize = 8192;

/// Largest payload accepted from the wire (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Interval at which the link factory re-checks for a link created by the
/// remote side after an `EXISTS` handshake answer.
pub const DEFAULT_LINK_POLL_INTERVAL_MS: u64 = 100;

/// How long the link factory waits for that link before giving up.
pub const DEFAULT_LINK_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Read timeout applied to both sides of the TCP handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Runtime configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NodeConfig {
    /// Node name embedded in the node id (no '-' allowed)
    pub name: String,
    /// Buffered reader/writer capacity per link
    pub link_buffer_size: usize,
    /// Disable Nagle on TCP links
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive on TCP links
    pub tcp_keepalive: bool,
    /// Maximum payload length accepted from a peer
    pub max_payload_size: usize,
    /// Handshake read timeout (milliseconds)
    pub handshake_timeout_ms: u64,
    /// Link factory poll interval (milliseconds)
    pub link_poll_interval_ms: u64,
    /// Link factory wait limit (milliseconds)
    pub link_wait_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            link_buffer_size: DEFAULT_LINK_BUFFER_SIZE,
            tcp_nodelay: true,
            tcp_keepalive: true,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            link_poll_interval_ms: DEFAULT_LINK_POLL_INTERVAL_MS,
            link_wait_timeout_ms: DEFAULT_LINK_WAIT_TIMEOUT_MS,
        }
    }
}

impl NodeConfig {
    /// Default configuration with the given node name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_interval_ms.max(1))
    }

    pub fn link_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.link_wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.link_buffer_size, 8192);
        assert!(cfg.tcp_nodelay);
        assert_eq!(cfg.link_poll_interval(), Duration::from_millis(100));
    }

    #[cfg(feature = "json")]
    #[test]
    fn partial_json_fills_defaults() {
        let cfg: NodeConfig =
            serde_json::from_str(r#"{"name": "edge", "link_wait_timeout_ms": 250}"#).unwrap();
        assert_eq!(cfg.name, "edge");
        assert_eq!(cfg.link_wait_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }
}
