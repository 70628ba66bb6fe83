// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node: the per-process context owning registries and links.
//!
//! Every primitive is created through a [`Node`]. Nothing is global, so
//! several nodes can share one process (tests attach them with loopback
//! links).
//!
//! # Example
//!
//! ```no_run
//! use cspnet::{Node, NodeConfig, Utf8Codec};
//!
//! let node = Node::bind_tcp(NodeConfig::named("server"), "127.0.0.1:7890".parse()?)?;
//! let mut input = node.net2one(Utf8Codec)?;
//! println!("listening at {}", input.location());
//! let line: String = input.read()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::barrier::NetBarrier;
use crate::channel::{NetChannelInput, NetChannelOutput, SharedChannelInput, SharedChannelOutput};
use crate::codec::Codec;
use crate::config::NodeConfig;
use crate::connection::{NetConnectionClient, NetConnectionServer};
use crate::descriptor::{BarrierDescriptor, ChannelDescriptor, ConnectionDescriptor};
use crate::error::{Error, Result};
use crate::link::manager::LinkManager;
use crate::link::{factory, Link};
use crate::location::{BarrierLocation, ChannelLocation, ConnectionLocation, NodeAddress, NodeId};
use crate::registry::{Handle, Registry};
use crate::transport::loopback::{self, Wire};
use crate::transport::tcp::{SocketOptions, TcpLinkServer};

/// Immunity used when none is given: nothing poisons the endpoint.
pub const DEFAULT_IMMUNITY: i32 = i32::MAX;

/// State shared by every endpoint and link of one node.
pub(crate) struct NodeContext {
    pub(crate) id: NodeId,
    pub(crate) config: NodeConfig,
    pub(crate) channels: Registry<ChannelDescriptor>,
    pub(crate) barriers: Registry<BarrierDescriptor>,
    pub(crate) connections: Registry<ConnectionDescriptor>,
    pub(crate) links: LinkManager,
}

impl NodeContext {
    fn new(id: NodeId, config: NodeConfig) -> Arc<Self> {
        Arc::new(Self {
            id,
            config,
            channels: Registry::new("channel"),
            barriers: Registry::new("barrier"),
            connections: Registry::new("connection"),
            links: LinkManager::new(),
        })
    }
}

/// Options for creating a channel input.
#[derive(Debug, Clone, Copy)]
pub struct InputOptions {
    /// Explicit handle; `None` allocates one
    pub handle: Option<Handle>,
    /// Poison of this strength or lower is ignored
    pub immunity: i32,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            handle: None,
            immunity: DEFAULT_IMMUNITY,
        }
    }
}

impl InputOptions {
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn immunity(mut self, immunity: i32) -> Self {
        self.immunity = immunity;
        self
    }
}

/// A networked CSP node.
pub struct Node {
    ctx: Arc<NodeContext>,
    server: Mutex<Option<TcpLinkServer>>,
}

impl Node {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Node listening for TCP links on `bind`.
    ///
    /// An unspecified bind IP advertises the host's primary local address.
    pub fn bind_tcp(config: NodeConfig, bind: SocketAddr) -> Result<Self> {
        let listener = TcpLinkServer::listen(bind)?;
        let mut advertised = listener.local_addr()?;
        if advertised.ip().is_unspecified() {
            let ip = local_ip_address::local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
            advertised.set_ip(ip);
        }

        let id = NodeId::new(&config.name, NodeAddress::Tcp(advertised))?;
        let options = SocketOptions::from_config(&config);
        let ctx = NodeContext::new(id, config);
        let server = TcpLinkServer::spawn(listener, Arc::downgrade(&ctx), options)?;
        log::info!("node {} up", ctx.id);
        Ok(Self {
            ctx,
            server: Mutex::new(Some(server)),
        })
    }

    /// Node reachable only through explicitly attached loopback links.
    pub fn loopback(name: &str) -> Result<Self> {
        Self::loopback_with(NodeConfig::named(name))
    }

    pub fn loopback_with(config: NodeConfig) -> Result<Self> {
        let id = NodeId::new(&config.name, NodeAddress::Loopback(config.name.clone()))?;
        Ok(Self {
            ctx: NodeContext::new(id, config),
            server: Mutex::new(None),
        })
    }

    /// Connect two nodes with an in-memory link and start it on both sides.
    ///
    /// The returned [`Wire`] can be severed to simulate transport failure.
    pub fn attach_loopback(a: &Node, b: &Node) -> Result<Wire> {
        let (to_b, to_a) = loopback::pair(a.id().clone(), b.id().clone());
        let wire = to_b.wire();
        let link_ab = Link::new(&a.ctx, Box::new(to_b));
        let link_ba = Link::new(&b.ctx, Box::new(to_a));
        for (ctx, link) in [(&a.ctx, &link_ab), (&b.ctx, &link_ba)] {
            if !link.connect()? {
                return Err(Error::Connect("loopback wire already severed".into()));
            }
            if !ctx.links.register_link(link) {
                return Err(Error::Connect(format!(
                    "{} already linked to {}",
                    ctx.id,
                    link.remote_id()
                        .map(|id| id.to_string())
                        .unwrap_or_default()
                )));
            }
        }
        link_ab.start()?;
        link_ba.start()?;
        Ok(wire)
    }

    // ========================================================================
    // Identity and links
    // ========================================================================

    pub fn id(&self) -> &NodeId {
        &self.ctx.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.ctx.config
    }

    /// Address the TCP link server listens on, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.local_addr())
    }

    /// Link to the node answering at `address`, creating it if needed.
    pub fn connect(&self, address: &NodeAddress) -> Result<NodeId> {
        let link = factory::get_link_by_address(&self.ctx, address)?;
        link.remote_id()
            .ok_or_else(|| Error::Connect(format!("{} did not identify itself", address)))
    }

    /// Link to `remote`, creating it if needed.
    pub fn link_to(&self, remote: &NodeId) -> Result<Arc<Link>> {
        factory::get_link(&self.ctx, remote)
    }

    pub fn link_manager(&self) -> &LinkManager {
        &self.ctx.links
    }

    /// Subscribe to link-loss events (the remote node id of each lost link).
    pub fn link_lost_events(&self) -> Receiver<NodeId> {
        self.ctx.links.link_lost_events()
    }

    /// Stop accepting links and tear down every established one.
    pub fn shutdown(&self) {
        if let Some(mut server) = self.server.lock().take() {
            server.stop();
        }
        for link in self.ctx.links.links() {
            link.destroy_resources();
        }
    }

    pub(crate) fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Channel input with an allocated handle and no poison immunity limit.
    pub fn net2one<T, C: Codec<T>>(&self, codec: C) -> Result<NetChannelInput<T, C>> {
        NetChannelInput::create(&self.ctx, InputOptions::default(), codec)
    }

    pub fn net2one_with<T, C: Codec<T>>(
        &self,
        options: InputOptions,
        codec: C,
    ) -> Result<NetChannelInput<T, C>> {
        NetChannelInput::create(&self.ctx, options, codec)
    }

    /// Channel input shared by several reading threads.
    pub fn net2any<T, C: Codec<T>>(
        &self,
        options: InputOptions,
        codec: C,
    ) -> Result<SharedChannelInput<T, C>> {
        NetChannelInput::create(&self.ctx, options, codec).map(SharedChannelInput::new)
    }

    /// Channel output writing to `target`.
    pub fn one2net<T, C: Codec<T>>(
        &self,
        target: &ChannelLocation,
        codec: C,
    ) -> Result<NetChannelOutput<T, C>> {
        NetChannelOutput::create(&self.ctx, target, DEFAULT_IMMUNITY, codec)
    }

    /// Channel output that records the remote end's poison immunity.
    pub fn one2net_with<T, C: Codec<T>>(
        &self,
        target: &ChannelLocation,
        immunity: i32,
        codec: C,
    ) -> Result<NetChannelOutput<T, C>> {
        NetChannelOutput::create(&self.ctx, target, immunity, codec)
    }

    /// Channel output shared by several writing threads.
    pub fn any2net<T, C: Codec<T>>(
        &self,
        target: &ChannelLocation,
        immunity: i32,
        codec: C,
    ) -> Result<SharedChannelOutput<T, C>> {
        NetChannelOutput::create(&self.ctx, target, immunity, codec).map(SharedChannelOutput::new)
    }

    // ========================================================================
    // Barriers
    // ========================================================================

    /// Server end expecting `local_enrolled` local and `remote_enrolled`
    /// client ends.
    pub fn barrier_server(&self, local_enrolled: usize, remote_enrolled: usize) -> Result<NetBarrier> {
        NetBarrier::server(&self.ctx, None, local_enrolled, remote_enrolled)
    }

    pub fn numbered_barrier_server(
        &self,
        handle: Handle,
        local_enrolled: usize,
        remote_enrolled: usize,
    ) -> Result<NetBarrier> {
        NetBarrier::server(&self.ctx, Some(handle), local_enrolled, remote_enrolled)
    }

    /// Client end synchronising with the server at `server`.
    pub fn barrier_client(&self, server: &BarrierLocation, local_enrolled: usize) -> Result<NetBarrier> {
        NetBarrier::client(&self.ctx, server, local_enrolled)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn connection_server<Req, Rep, C>(&self, codec: C) -> Result<NetConnectionServer<Req, Rep, C>>
    where
        C: Codec<Req> + Codec<Rep>,
    {
        NetConnectionServer::create(&self.ctx, None, codec)
    }

    pub fn numbered_connection_server<Req, Rep, C>(
        &self,
        handle: Handle,
        codec: C,
    ) -> Result<NetConnectionServer<Req, Rep, C>>
    where
        C: Codec<Req> + Codec<Rep>,
    {
        NetConnectionServer::create(&self.ctx, Some(handle), codec)
    }

    pub fn connection_client<Req, Rep, C>(
        &self,
        server: &ConnectionLocation,
        codec: C,
    ) -> Result<NetConnectionClient<Req, Rep, C>>
    where
        C: Codec<Req> + Codec<Rep>,
    {
        NetConnectionClient::create(&self.ctx, server, codec)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.ctx.id.to_string()).finish()
    }
}
