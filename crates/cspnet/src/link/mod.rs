// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link: the protocol engine for one remote node.
//!
//! Each link owns a transport and runs two threads:
//!
//! ```text
//!  endpoints --send()--> [tx queue] --tx loop--> writer ==wire==> peer
//!  peer ==wire==> reader --rx loop--> dispatch::route --> descriptor queues
//! ```
//!
//! Any I/O failure in either loop tears the transport down and runs
//! [`Link::lost_link`], which sends one LINK_LOST to every channel output,
//! barrier end and connection registered with the link. After a write failure
//! the tx loop keeps draining its queue and answers LINK_LOST to the source of
//! every SEND, SYNC, OPEN and REQUEST it could not transmit. Each endpoint
//! hears of the loss once.

pub(crate) mod dispatch;
pub(crate) mod factory;
pub mod manager;
pub(crate) mod peer;

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::descriptor::{notify_link_lost, BarrierDescriptor, Delivery, ReplyPath};
use crate::error::{Error, Result};
use crate::location::NodeId;
use crate::node::NodeContext;
use crate::protocol::{read_message, write_message, MessageType, NetworkMessage};
use crate::registry::Handle;
use crate::transport::{BoxedReader, BoxedWriter, Transport};

/// Which registry a registered handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Family {
    Channel,
    Barrier,
    Connection,
}

/// Descriptors routed through this link, kept only to broadcast failure.
#[derive(Default)]
struct Registrations {
    connected: bool,
    lost: bool,
    channels: HashMap<Handle, Sender<Delivery>>,
    barriers: HashMap<Handle, Sender<Delivery>>,
    connections: HashMap<Handle, Sender<Delivery>>,
    /// Endpoints already sent their LINK_LOST
    notified: HashSet<(Family, Handle)>,
}

impl Registrations {
    fn register(&mut self, family: Family, handle: Handle, queue: &Sender<Delivery>) {
        if self.connected {
            let table = match family {
                Family::Channel => &mut self.channels,
                Family::Barrier => &mut self.barriers,
                Family::Connection => &mut self.connections,
            };
            table.insert(handle, queue.clone());
        } else {
            self.notified.insert((family, handle));
            notify_link_lost(queue, handle);
        }
    }
}

/// Connection to a single remote node.
pub struct Link {
    node: Weak<NodeContext>,
    remote: RwLock<Option<NodeId>>,
    transport: Mutex<Box<dyn Transport>>,
    tx: Sender<NetworkMessage>,
    tx_queue: Mutex<Option<Receiver<NetworkMessage>>>,
    registrations: Mutex<Registrations>,
}

impl Link {
    pub(crate) fn new(node: &Arc<NodeContext>, transport: Box<dyn Transport>) -> Arc<Self> {
        let (tx, rx) = channel::unbounded();
        let remote = transport.remote_id().cloned();
        Arc::new(Self {
            node: Arc::downgrade(node),
            remote: RwLock::new(remote),
            transport: Mutex::new(transport),
            tx,
            tx_queue: Mutex::new(Some(rx)),
            registrations: Mutex::new(Registrations::default()),
        })
    }

    /// Identity of the remote node, known once the handshake has run.
    pub fn remote_id(&self) -> Option<NodeId> {
        self.remote.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.registrations.lock().connected
    }

    /// Run the transport handshake.
    ///
    /// Returns `Ok(false)` when the peer already holds a link to this node.
    pub(crate) fn connect(&self) -> Result<bool> {
        let node = self
            .node
            .upgrade()
            .ok_or_else(|| Error::Connect("node shut down".into()))?;
        let mut transport = self.transport.lock();
        let accepted = transport.connect(&node.id)?;
        *self.remote.write() = transport.remote_id().cloned();
        if accepted {
            self.registrations.lock().connected = true;
            log::debug!("link connected: {}", transport.describe());
        } else {
            log::debug!("link refused, peer holds one already: {}", transport.describe());
        }
        Ok(accepted)
    }

    /// Build the streams and start both loops.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        if !self.is_connected() && !self.connect()? {
            return Err(Error::Connect("peer refused link".into()));
        }
        let node = self
            .node
            .upgrade()
            .ok_or_else(|| Error::Connect("node shut down".into()))?;

        let (reader, writer, name) = {
            let mut transport = self.transport.lock();
            if !transport.create_resources(node.config.link_buffer_size)? {
                return Err(Error::Connect(format!(
                    "could not create resources for {}",
                    transport.describe()
                )));
            }
            let (reader, writer) = transport
                .take_streams()
                .ok_or_else(|| Error::Connect("transport streams already taken".into()))?;
            (reader, writer, transport.describe())
        };
        let queue = self
            .tx_queue
            .lock()
            .take()
            .ok_or_else(|| Error::Connect("link already started".into()))?;

        let max_payload = node.config.max_payload_size;
        let tx_link = Arc::downgrade(self);
        thread::Builder::new()
            .name("cspnet-link-tx".to_string())
            .spawn(move || tx_loop(tx_link, queue, writer))?;

        let rx_link = Arc::clone(self);
        let rx_node = self.node.clone();
        thread::Builder::new()
            .name("cspnet-link-rx".to_string())
            .spawn(move || rx_loop(rx_link, rx_node, reader, max_payload))?;

        log::info!("link started: {}", name);
        Ok(())
    }

    /// Queue a message for transmission.
    pub(crate) fn send(&self, msg: NetworkMessage) {
        // The tx loop owns the receiver for as long as any Link handle exists.
        let _ = self.tx.send(msg);
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub(crate) fn register_channel(&self, handle: Handle, queue: &Sender<Delivery>) {
        self.registrations
            .lock()
            .register(Family::Channel, handle, queue);
    }

    pub(crate) fn deregister_channel(&self, handle: Handle) {
        self.registrations.lock().channels.remove(&handle);
    }

    pub(crate) fn register_barrier(&self, handle: Handle, queue: &Sender<Delivery>) {
        self.registrations
            .lock()
            .register(Family::Barrier, handle, queue);
    }

    pub(crate) fn deregister_barrier(&self, handle: Handle) {
        self.registrations.lock().barriers.remove(&handle);
    }

    pub(crate) fn register_connection(&self, handle: Handle, queue: &Sender<Delivery>) {
        self.registrations
            .lock()
            .register(Family::Connection, handle, queue);
    }

    pub(crate) fn deregister_connection(&self, handle: Handle) {
        self.registrations.lock().connections.remove(&handle);
    }

    // ========================================================================
    // Failure
    // ========================================================================

    /// Close the transport and propagate the loss.
    pub fn destroy_resources(&self) {
        self.transport.lock().destroy_resources();
        self.lost_link();
    }

    /// Mark the link dead and notify every registered descriptor once.
    pub(crate) fn lost_link(&self) {
        let mut regs = self.registrations.lock();
        if regs.lost {
            return;
        }
        regs.lost = true;
        regs.connected = false;

        if let Some(node) = self.node.upgrade() {
            node.links.lost_link(self);
        }

        log::warn!(
            "link to {} lost: notifying {} channel(s), {} barrier(s), {} connection(s)",
            self.remote_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<unknown>".to_string()),
            regs.channels.len(),
            regs.barriers.len(),
            regs.connections.len()
        );

        let regs = &mut *regs;
        let registered = regs
            .channels
            .drain()
            .map(|(h, q)| (Family::Channel, h, q))
            .chain(regs.barriers.drain().map(|(h, q)| (Family::Barrier, h, q)))
            .chain(regs.connections.drain().map(|(h, q)| (Family::Connection, h, q)));
        for (family, handle, queue) in registered {
            regs.notified.insert((family, handle));
            notify_link_lost(&queue, handle);
        }
    }

    /// Tell the local source of an untransmitted message that this link died,
    /// unless it has already been told.
    fn answer_untransmitted(&self, msg: &NetworkMessage) {
        let family = match msg.kind {
            MessageType::Send | MessageType::AsyncSend => Family::Channel,
            MessageType::Sync => Family::Barrier,
            MessageType::Open | MessageType::Request => Family::Connection,
            _ => return,
        };
        let source = msg.attr2;
        if !self.registrations.lock().notified.insert((family, source)) {
            return;
        }
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let queue = match family {
            Family::Channel => node.channels.get(source).map(|d| d.queue().clone()),
            Family::Barrier => node.barriers.get(source).map(|d| d.queue().clone()),
            Family::Connection => node.connections.get(source).map(|d| d.queue().clone()),
        };
        if let Some(queue) = queue {
            notify_link_lost(&queue, source);
        }
    }
}

// ============================================================================
// Loops
// ============================================================================

fn tx_loop(link: Weak<Link>, queue: Receiver<NetworkMessage>, mut writer: BoxedWriter) {
    let failed = loop {
        let Ok(msg) = queue.recv() else {
            return;
        };
        let written = write_message(&mut writer, &msg).and_then(|()| writer.flush());
        if let Err(e) = written {
            log::debug!("link tx failed: {}", e);
            break msg;
        }
    };

    if let Some(link) = link.upgrade() {
        link.destroy_resources();
    }

    // Nothing queued from here on reaches the wire; answer whoever waits.
    // The loop ends once the last handle on the link is dropped.
    for msg in std::iter::once(failed).chain(queue.iter()) {
        let Some(link) = link.upgrade() else {
            return;
        };
        link.answer_untransmitted(&msg);
    }
}

fn rx_loop(link: Arc<Link>, node: Weak<NodeContext>, mut reader: BoxedReader, max_payload: usize) {
    // Barrier servers that accepted an ENROLL over this link, one entry per
    // enrolled client end.
    let mut enrolled: Vec<Arc<BarrierDescriptor>> = Vec::new();

    loop {
        match read_message(&mut reader, max_payload) {
            Ok(msg) => {
                let Some(ctx) = node.upgrade() else {
                    break;
                };
                dispatch::route(&ctx, msg, ReplyPath::Link(Arc::clone(&link)), Some(&mut enrolled));
            }
            Err(e) => {
                log::debug!("link rx ended: {}", e);
                break;
            }
        }
    }

    link.destroy_resources();
    for barrier in enrolled {
        notify_link_lost(barrier.queue(), barrier.handle());
    }
}
