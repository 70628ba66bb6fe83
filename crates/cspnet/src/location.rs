// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node identities and symbolic locations of remote primitives.
//!
//! String forms:
//!
//! ```text
//! NodeAddress         tcpip\\192.168.1.4:7890   |  loopback\\alpha
//! NodeId              <time>-<mem>-<hash>-<name>-<address>
//! ChannelLocation     ncl://<node-id>/<handle>
//! BarrierLocation     nbl://<node-id>/<handle>
//! ConnectionLocation  nconnl://<node-id>/<handle>
//! ```
//!
//! Parsing is the exact inverse of formatting. The literal `null` (any case)
//! parses to `None` through the `parse_optional` constructors.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::registry::Handle;

const ADDRESS_SEPARATOR: &str = "\\\\";

// ============================================================================
// Node Address
// ============================================================================

/// Transport address of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeAddress {
    /// TCP/IP endpoint
    Tcp(SocketAddr),
    /// In-process loopback node, addressed by name
    Loopback(String),
}

impl NodeAddress {
    /// Protocol identifier used in the string form.
    pub fn protocol(&self) -> &'static str {
        match self {
            NodeAddress::Tcp(_) => "tcpip",
            NodeAddress::Loopback(_) => "loopback",
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAddress::Tcp(addr) => write!(f, "{}{}{}", self.protocol(), ADDRESS_SEPARATOR, addr),
            NodeAddress::Loopback(name) => {
                write!(f, "{}{}{}", self.protocol(), ADDRESS_SEPARATOR, name)
            }
        }
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (protocol, address) = s
            .split_once(ADDRESS_SEPARATOR)
            .ok_or_else(|| Error::InvalidArgument(format!("not a node address: {:?}", s)))?;
        match protocol {
            "tcpip" => address
                .parse()
                .map(NodeAddress::Tcp)
                .map_err(|_| Error::InvalidArgument(format!("bad tcpip address: {:?}", address))),
            "loopback" if !address.is_empty() => Ok(NodeAddress::Loopback(address.to_string())),
            _ => Err(Error::InvalidArgument(format!(
                "unsupported node address: {:?}",
                s
            ))),
        }
    }
}

// ============================================================================
// Node ID
// ============================================================================

/// Globally unique identity of a node.
///
/// Ordering compares creation time first, then the memory sample, the hash,
/// the name and finally the address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    time: i64,
    mem: i64,
    hash: i32,
    name: String,
    address: NodeAddress,
}

impl NodeId {
    /// Mint a fresh identity for a node reachable at `address`.
    pub fn new(name: &str, address: NodeAddress) -> Result<Self> {
        if name.contains('-') || name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "node name may not contain '-' or '/': {:?}",
                name
            )));
        }
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_i64(time);
        hasher.write_u32(std::process::id());
        Ok(Self {
            time,
            mem: i64::from(std::process::id()),
            hash: (hasher.finish() & 0x7fff_ffff) as i32,
            name: name.to_string(),
            address,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.time, self.mem, self.hash, self.name, self.address
        )
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidArgument(format!("not a node id: {:?}", s));
        let mut parts = s.splitn(5, '-');
        let time = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let mem = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let hash = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let name = parts.next().ok_or_else(bad)?.to_string();
        let address = parts.next().ok_or_else(bad)?.parse()?;
        Ok(Self {
            time,
            mem,
            hash,
            name,
            address,
        })
    }
}

// ============================================================================
// Locations
// ============================================================================

macro_rules! location {
    ($(#[$doc:meta])* $name:ident, $scheme:literal) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            node: NodeId,
            handle: Handle,
        }

        impl $name {
            pub fn new(node: NodeId, handle: Handle) -> Self {
                Self { node, handle }
            }

            pub fn node_id(&self) -> &NodeId {
                &self.node
            }

            pub fn handle(&self) -> Handle {
                self.handle
            }

            /// Parse, mapping the literal `null` to `None`.
            pub fn parse_optional(s: &str) -> Result<Option<Self>> {
                if s.eq_ignore_ascii_case("null") {
                    return Ok(None);
                }
                s.parse().map(Some)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}/{}", $scheme, self.node, self.handle)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let bad = || {
                    Error::InvalidArgument(format!(
                        concat!("not a ", $scheme, " location: {:?}"),
                        s
                    ))
                };
                let rest = s.strip_prefix($scheme).ok_or_else(bad)?;
                let (node, handle) = rest.rsplit_once('/').ok_or_else(bad)?;
                let handle: Handle = handle.parse().map_err(|_| bad())?;
                if handle < 0 {
                    return Err(bad());
                }
                Ok(Self {
                    node: node.parse()?,
                    handle,
                })
            }
        }
    };
}

location!(
    /// Address of a networked channel input.
    ChannelLocation,
    "ncl://"
);
location!(
    /// Address of a networked barrier server end.
    BarrierLocation,
    "nbl://"
);
location!(
    /// Address of a networked connection server.
    ConnectionLocation,
    "nconnl://"
);

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_id(name: &str) -> NodeId {
        NodeId::new(name, "tcpip\\\\127.0.0.1:7890".parse().unwrap()).unwrap()
    }

    #[test]
    fn address_string_forms() {
        let addr: NodeAddress = "tcpip\\\\10.0.0.2:4000".parse().unwrap();
        assert_eq!(addr, NodeAddress::Tcp("10.0.0.2:4000".parse().unwrap()));
        assert_eq!(addr.to_string(), "tcpip\\\\10.0.0.2:4000");

        let lo: NodeAddress = "loopback\\\\alpha".parse().unwrap();
        assert_eq!(lo, NodeAddress::Loopback("alpha".into()));

        assert!("tcpip:10.0.0.2:4000".parse::<NodeAddress>().is_err());
        assert!("udp\\\\10.0.0.2:4000".parse::<NodeAddress>().is_err());
        assert!("tcpip\\\\nowhere".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn node_id_round_trip() {
        let id = tcp_id("worker");
        let text = id.to_string();
        assert!(text.ends_with("-worker-tcpip\\\\127.0.0.1:7890"));
        let parsed: NodeId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn node_id_allows_empty_name() {
        let id = tcp_id("");
        assert_eq!(id.to_string().parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn node_name_with_separator_rejected() {
        let addr = NodeAddress::Loopback("x".into());
        assert!(NodeId::new("a-b", addr).is_err());
    }

    #[test]
    fn channel_location_round_trip() {
        let loc = ChannelLocation::new(tcp_id("n"), 100);
        let text = loc.to_string();
        assert!(text.starts_with("ncl://"));
        assert!(text.ends_with("/100"));
        assert_eq!(text.parse::<ChannelLocation>().unwrap(), loc);
    }

    #[test]
    fn schemes_are_not_interchangeable() {
        let text = BarrierLocation::new(tcp_id("n"), 50).to_string();
        assert!(text.starts_with("nbl://"));
        assert!(text.parse::<ChannelLocation>().is_err());
        assert!(text.parse::<BarrierLocation>().is_ok());

        let conn = ConnectionLocation::new(tcp_id("n"), 51).to_string();
        assert!(conn.starts_with("nconnl://"));
        assert_eq!(conn.parse::<ConnectionLocation>().unwrap().handle(), 51);
    }

    #[test]
    fn null_parses_to_none() {
        assert_eq!(ChannelLocation::parse_optional("null").unwrap(), None);
        assert_eq!(BarrierLocation::parse_optional("NULL").unwrap(), None);
        assert!(ChannelLocation::parse_optional("ncl://garbage").is_err());
        assert!("null".parse::<ChannelLocation>().is_err());
    }

    #[test]
    fn malformed_handles_rejected() {
        let node = tcp_id("n");
        assert!(format!("ncl://{}/abc", node).parse::<ChannelLocation>().is_err());
        assert!(format!("ncl://{}/-3", node).parse::<ChannelLocation>().is_err());
        assert!(format!("ncl://{}", node).parse::<ChannelLocation>().is_err());
    }
}
