// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint descriptors and the delivery queues that feed them.
//!
//! A descriptor is the routing-visible half of an endpoint: its handle, its
//! state and the sending side of its delivery queue. Link receive loops and
//! local senders inspect the state under the descriptor's own lock before
//! queueing anything. The endpoint object keeps the receiving side.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};

use crate::link::Link;
use crate::protocol::{MessageType, NetworkMessage, NO_ATTR};
use crate::registry::{Handle, Indexed};

// ============================================================================
// Delivery
// ============================================================================

/// Where replies to a delivered message go.
#[derive(Clone)]
pub(crate) enum ReplyPath {
    /// Back over the link the message arrived on
    Link(Arc<Link>),
    /// Straight into a local endpoint's delivery queue
    Local(Sender<Delivery>),
}

impl ReplyPath {
    pub(crate) fn send(&self, msg: NetworkMessage) {
        match self {
            ReplyPath::Link(link) => link.send(msg),
            ReplyPath::Local(queue) => {
                // Receiver gone means the endpoint was dropped; nobody waits.
                let _ = queue.send(Delivery { msg, reply: None });
            }
        }
    }

    /// The link behind this path, if the peer is remote.
    pub(crate) fn link(&self) -> Option<&Arc<Link>> {
        match self {
            ReplyPath::Link(link) => Some(link),
            ReplyPath::Local(_) => None,
        }
    }

    /// True when both paths lead back to the same endpoint queue or link.
    pub(crate) fn same_peer(&self, other: &ReplyPath) -> bool {
        match (self, other) {
            (ReplyPath::Link(a), ReplyPath::Link(b)) => Arc::ptr_eq(a, b),
            (ReplyPath::Local(a), ReplyPath::Local(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ReplyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyPath::Link(_) => f.write_str("ReplyPath::Link"),
            ReplyPath::Local(_) => f.write_str("ReplyPath::Local"),
        }
    }
}

/// A message sitting in an endpoint queue, with its reply path.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub msg: NetworkMessage,
    pub reply: Option<ReplyPath>,
}

impl Delivery {
    /// Reply to the sender of this delivery, if it has one.
    pub(crate) fn respond(&self, msg: NetworkMessage) {
        if let Some(reply) = &self.reply {
            reply.send(msg);
        }
    }
}

/// Queue a LINK_LOST notification addressed to `handle`.
pub(crate) fn notify_link_lost(queue: &Sender<Delivery>, handle: Handle) {
    let _ = queue.send(Delivery {
        msg: NetworkMessage::new(MessageType::LinkLost, handle, NO_ATTR),
        reply: None,
    });
}

// ============================================================================
// Channel
// ============================================================================

/// Lifecycle state of a channel end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Inactive,
    ActiveInput,
    ActiveOutput,
    Poisoned,
    Destroyed,
    Broken,
    /// Reserved for endpoint mobility
    Moving,
    /// Reserved for endpoint mobility
    Moved,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub(crate) struct ChannelData {
    pub state: ChannelState,
    /// -1 until poisoned; never decreases
    pub poison_level: i32,
    pub immunity_level: i32,
}

impl ChannelData {
    /// Raise the poison level; lower strengths are ignored.
    pub(crate) fn raise_poison(&mut self, strength: i32) {
        self.poison_level = self.poison_level.max(strength);
    }
}

pub(crate) struct ChannelDescriptor {
    handle: AtomicI32,
    queue: Sender<Delivery>,
    data: Mutex<ChannelData>,
}

impl ChannelDescriptor {
    pub(crate) fn new(state: ChannelState, immunity_level: i32) -> (Arc<Self>, Receiver<Delivery>) {
        let (queue, rx) = channel::unbounded();
        let desc = Arc::new(Self {
            handle: AtomicI32::new(NO_ATTR),
            queue,
            data: Mutex::new(ChannelData {
                state,
                poison_level: -1,
                immunity_level,
            }),
        });
        (desc, rx)
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ChannelData> {
        self.data.lock()
    }

    pub(crate) fn queue(&self) -> &Sender<Delivery> {
        &self.queue
    }

    pub(crate) fn deliver(&self, msg: NetworkMessage, reply: Option<ReplyPath>) {
        let _ = self.queue.send(Delivery { msg, reply });
    }
}

impl Indexed for ChannelDescriptor {
    fn bind_handle(&self, handle: Handle) {
        self.handle.store(handle, Ordering::Release);
    }
}

// ============================================================================
// Barrier
// ============================================================================

/// Lifecycle state of a barrier end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BarrierState {
    Inactive,
    ActiveServer,
    ActiveClient,
    Broken,
    Destroyed,
    Resigned,
}

impl fmt::Display for BarrierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub(crate) struct BarrierDescriptor {
    handle: AtomicI32,
    queue: Sender<Delivery>,
    state: Mutex<BarrierState>,
}

impl BarrierDescriptor {
    pub(crate) fn new(state: BarrierState) -> (Arc<Self>, Receiver<Delivery>) {
        let (queue, rx) = channel::unbounded();
        let desc = Arc::new(Self {
            handle: AtomicI32::new(NO_ATTR),
            queue,
            state: Mutex::new(state),
        });
        (desc, rx)
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock()
    }

    pub(crate) fn state(&self) -> BarrierState {
        *self.state.lock()
    }

    pub(crate) fn queue(&self) -> &Sender<Delivery> {
        &self.queue
    }

    pub(crate) fn deliver(&self, msg: NetworkMessage, reply: Option<ReplyPath>) {
        let _ = self.queue.send(Delivery { msg, reply });
    }
}

impl Indexed for BarrierDescriptor {
    fn bind_handle(&self, handle: Handle) {
        self.handle.store(handle, Ordering::Release);
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Lifecycle state of a connection end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Inactive,
    ClientClosed,
    ClientRequested,
    ClientOpen,
    ServerClosed,
    ServerOpen,
    ServerReceived,
    Broken,
    Destroyed,
}

impl ConnectionState {
    pub(crate) fn is_server(self) -> bool {
        matches!(
            self,
            ConnectionState::ServerClosed
                | ConnectionState::ServerOpen
                | ConnectionState::ServerReceived
        )
    }

    pub(crate) fn is_client(self) -> bool {
        matches!(
            self,
            ConnectionState::ClientClosed
                | ConnectionState::ClientRequested
                | ConnectionState::ClientOpen
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub(crate) struct ConnectionDescriptor {
    handle: AtomicI32,
    queue: Sender<Delivery>,
    /// OPEN requests waiting for a server; `None` on client ends
    open_queue: Option<Sender<Delivery>>,
    state: Mutex<ConnectionState>,
}

impl ConnectionDescriptor {
    pub(crate) fn client() -> (Arc<Self>, Receiver<Delivery>) {
        let (queue, rx) = channel::unbounded();
        let desc = Arc::new(Self {
            handle: AtomicI32::new(NO_ATTR),
            queue,
            open_queue: None,
            state: Mutex::new(ConnectionState::ClientClosed),
        });
        (desc, rx)
    }

    /// Server descriptor plus its (session, open) receivers.
    pub(crate) fn server() -> (Arc<Self>, Receiver<Delivery>, Receiver<Delivery>) {
        let (queue, rx) = channel::unbounded();
        let (open_queue, open_rx) = channel::unbounded();
        let desc = Arc::new(Self {
            handle: AtomicI32::new(NO_ATTR),
            queue,
            open_queue: Some(open_queue),
            state: Mutex::new(ConnectionState::ServerClosed),
        });
        (desc, rx, open_rx)
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn queue(&self) -> &Sender<Delivery> {
        &self.queue
    }

    pub(crate) fn deliver(&self, msg: NetworkMessage, reply: Option<ReplyPath>) {
        let _ = self.queue.send(Delivery { msg, reply });
    }

    pub(crate) fn deliver_open(&self, msg: NetworkMessage, reply: Option<ReplyPath>) {
        if let Some(open) = &self.open_queue {
            let _ = open.send(Delivery { msg, reply });
        }
    }
}

impl Indexed for ConnectionDescriptor {
    fn bind_handle(&self, handle: Handle) {
        self.handle.store(handle, Ordering::Release);
    }
}
