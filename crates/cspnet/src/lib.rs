// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # cspnet - networked CSP primitives
//!
//! Channels, barriers and request/reply connections whose ends live on
//! different nodes, carried over point-to-point links between nodes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cspnet::{Node, NodeConfig, Utf8Codec, ChannelLocation};
//!
//! fn main() -> cspnet::Result<()> {
//!     let node = Node::bind_tcp(NodeConfig::named("writer"), "0.0.0.0:0".parse().unwrap())?;
//!
//!     // Location printed by the reading node, e.g. ncl://<node id>/50
//!     let target: ChannelLocation = std::env::args().nth(1).unwrap_or_default().parse()?;
//!     let mut out = node.one2net(&target, Utf8Codec)?;
//!     out.write(&"hello".to_string())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                           Endpoints                                 |
//! |   NetChannelInput/Output | NetBarrier | NetConnectionClient/Server  |
//! +---------------------------------------------------------------------+
//! |                    Descriptors and registries                       |
//! |   handle -> descriptor (state + delivery queue), one per kind       |
//! +---------------------------------------------------------------------+
//! |                             Links                                   |
//! |   tx thread (queue -> wire) | rx thread (wire -> dispatch)          |
//! |   LinkManager (one link per remote node) | link factory             |
//! +---------------------------------------------------------------------+
//! |                           Transports                                |
//! |   TCP (handshake: utf node id, OK/EXISTS) | in-memory loopback      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | Owns registries, links and the TCP link server |
//! | [`NetChannelInput`] / [`NetChannelOutput`] | Two ends of a networked channel |
//! | [`NetBarrier`] | Server or client end of a distributed barrier |
//! | [`NetConnectionServer`] / [`NetConnectionClient`] | Request/reply session |
//! | [`Codec`] | Converts values to and from message payloads |
//! | [`Alternative`] | Waits for the first ready input among several |

/// Alternation over inputs.
pub mod alt;
/// Distributed barrier ends.
pub mod barrier;
/// Channel ends and their shared wrappers.
pub mod channel;
/// Payload codecs.
pub mod codec;
/// Node configuration.
pub mod config;
/// Request/reply connections.
pub mod connection;
pub(crate) mod descriptor;
/// Error type shared by every operation.
pub mod error;
/// Links between nodes.
pub mod link;
/// Node, barrier, channel and connection addresses.
pub mod location;
/// The node context.
pub mod node;
/// Network message model and wire format.
pub mod protocol;
pub(crate) mod registry;
/// Byte-stream transports under a link.
pub mod transport;

pub use alt::{AltGuard, Alternative, Guard};
pub use barrier::NetBarrier;
pub use channel::{
    ExtendedRead, NetChannelInput, NetChannelOutput, SharedChannelInput, SharedChannelOutput,
};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codec::{Codec, RawCodec, Utf8Codec};
pub use config::NodeConfig;
pub use connection::{NetConnectionClient, NetConnectionServer};
pub use descriptor::{BarrierState, ChannelState, ConnectionState};
pub use error::{Error, Result};
pub use link::manager::LinkManager;
pub use link::Link;
pub use location::{BarrierLocation, ChannelLocation, ConnectionLocation, NodeAddress, NodeId};
pub use node::{InputOptions, Node, DEFAULT_IMMUNITY};
pub use registry::{Handle, FIRST_DYNAMIC_HANDLE};
pub use transport::loopback::Wire;
