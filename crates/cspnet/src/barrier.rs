// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributed two-tier barrier.
//!
//! One server end and any number of client ends, each with its own local
//! participants. A sync cycle completes in two phases:
//!
//! ```text
//!  local phase    every local participant of an end calls sync();
//!                 all but the last block on the end's condvar
//!  network phase  the last local arrival of a client sends SYNC and waits
//!                 for RELEASE; the last local arrival of the server waits
//!                 until every enrolled client end has sent SYNC, then
//!                 answers each with RELEASE
//! ```
//!
//! The server's counters:
//! - `local_enrolled` / `local_countdown`: local participants.
//! - `net_enrolled` / `net_countdown`: remote client ends. A SYNC decrements
//!   the countdown and an ENROLL increments both.
//!
//! A cycle releases only when both countdowns reach zero in the same cycle.
//! No lock is held while the network phase waits on the delivery queue.

use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::descriptor::{BarrierDescriptor, BarrierState, Delivery};
use crate::error::{Error, Result};
use crate::link::peer::Peer;
use crate::location::BarrierLocation;
use crate::node::NodeContext;
use crate::protocol::{MessageType, NetworkMessage, NO_ATTR};
use crate::registry::Handle;

enum Role {
    Server,
    Client {
        server: BarrierLocation,
        peer: Peer,
    },
}

#[derive(Debug, Default)]
struct SyncState {
    local_enrolled: usize,
    local_countdown: usize,
    net_enrolled: usize,
    net_countdown: usize,
    /// Client ends announced at construction whose ENROLL is still expected
    initial_net_allowance: usize,
    /// SYNC messages waiting for RELEASE
    waiting: Vec<Delivery>,
    /// Bumped on every release
    generation: u64,
    /// A caller is running the network phase
    net_phase: bool,
    /// A local resignation handed the network phase to a waiter
    perform_net_sync: bool,
}

/// One end of a distributed barrier.
///
/// Shared between the local participants (wrap it in an `Arc`).
pub struct NetBarrier {
    node: Arc<NodeContext>,
    desc: Arc<BarrierDescriptor>,
    inbox: Receiver<Delivery>,
    role: Role,
    location: BarrierLocation,
    sync: Mutex<SyncState>,
    released: Condvar,
}

impl NetBarrier {
    pub(crate) fn server(
        node: &Arc<NodeContext>,
        handle: Option<Handle>,
        local_enrolled: usize,
        remote_enrolled: usize,
    ) -> Result<Self> {
        if local_enrolled < 1 {
            return Err(Error::InvalidArgument(
                "a barrier server needs at least one local participant".into(),
            ));
        }
        let (desc, inbox) = BarrierDescriptor::new(BarrierState::ActiveServer);
        let handle = match handle {
            Some(handle) => {
                node.barriers.create_at(handle, Arc::clone(&desc))?;
                handle
            }
            None => node.barriers.create(Arc::clone(&desc)),
        };
        log::debug!(
            "barrier server {} ({} local, {} remote)",
            handle,
            local_enrolled,
            remote_enrolled
        );
        Ok(Self {
            node: Arc::clone(node),
            location: BarrierLocation::new(node.id.clone(), handle),
            desc,
            inbox,
            role: Role::Server,
            sync: Mutex::new(SyncState {
                local_enrolled,
                local_countdown: local_enrolled,
                net_enrolled: remote_enrolled,
                net_countdown: remote_enrolled,
                initial_net_allowance: remote_enrolled,
                ..SyncState::default()
            }),
            released: Condvar::new(),
        })
    }

    pub(crate) fn client(
        node: &Arc<NodeContext>,
        server: &BarrierLocation,
        local_enrolled: usize,
    ) -> Result<Self> {
        if local_enrolled < 1 {
            return Err(Error::InvalidArgument(
                "a barrier client needs at least one local participant".into(),
            ));
        }
        let peer = Peer::resolve(node, server.node_id())?;
        if matches!(peer, Peer::Local) {
            let is_server = node
                .barriers
                .get(server.handle())
                .is_some_and(|b| b.state() == BarrierState::ActiveServer);
            if !is_server {
                return Err(Error::InvalidArgument(format!(
                    "{} is not a barrier server",
                    server
                )));
            }
        }

        let (desc, inbox) = BarrierDescriptor::new(BarrierState::ActiveClient);
        let handle = node.barriers.create(Arc::clone(&desc));
        if let Some(link) = peer.link() {
            link.register_barrier(handle, desc.queue());
        }
        peer.send(
            node,
            NetworkMessage::new(MessageType::Enroll, server.handle(), handle),
            desc.queue(),
        );
        log::debug!("barrier client {} enrolled with {}", handle, server);

        Ok(Self {
            node: Arc::clone(node),
            location: BarrierLocation::new(node.id.clone(), handle),
            desc,
            inbox,
            role: Role::Client {
                server: server.clone(),
                peer,
            },
            sync: Mutex::new(SyncState {
                local_enrolled,
                local_countdown: local_enrolled,
                ..SyncState::default()
            }),
            released: Condvar::new(),
        })
    }

    /// Location of this end.
    pub fn location(&self) -> &BarrierLocation {
        &self.location
    }

    /// Location of the server this client end synchronises with.
    pub fn server_location(&self) -> &BarrierLocation {
        match &self.role {
            Role::Server => &self.location,
            Role::Client { server, .. } => server,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server)
    }

    pub fn state(&self) -> BarrierState {
        self.desc.state()
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Wait until every participant, local and remote, has called `sync`.
    pub fn sync(&self) -> Result<()> {
        self.check_active()?;
        let mut st = self.sync.lock();
        while st.net_phase {
            self.released.wait(&mut st);
        }
        self.check_active()?;
        self.drain(&mut st)?;

        if st.local_enrolled == 0 {
            return Err(Error::ProtocolMisuse("sync with no enrolled participant"));
        }

        if st.local_countdown > 1 {
            st.local_countdown -= 1;
            let generation = st.generation;
            loop {
                self.released.wait(&mut st);
                if st.generation != generation {
                    return Ok(());
                }
                self.check_active()?;
                if st.perform_net_sync && !st.net_phase {
                    st.perform_net_sync = false;
                    break;
                }
            }
        }

        st.net_phase = true;
        let outcome = match &self.role {
            Role::Server => self.server_phase(&mut st),
            Role::Client { server, peer } => self.client_phase(&mut st, server, peer),
        };
        st.net_phase = false;

        if outcome.is_ok() {
            st.local_countdown = st.local_enrolled;
            st.net_countdown = st.net_enrolled;
            st.perform_net_sync = false;
            st.generation = st.generation.wrapping_add(1);
            let own = self.desc.handle();
            for waiting in st.waiting.drain(..) {
                waiting.respond(NetworkMessage::new(
                    MessageType::Release,
                    waiting.msg.attr2,
                    own,
                ));
            }
        }
        self.released.notify_all();
        outcome
    }

    fn client_phase(
        &self,
        st: &mut MutexGuard<'_, SyncState>,
        server: &BarrierLocation,
        peer: &Peer,
    ) -> Result<()> {
        peer.send(
            &self.node,
            NetworkMessage::new(MessageType::Sync, server.handle(), self.desc.handle()),
            self.desc.queue(),
        );
        loop {
            let delivery = MutexGuard::unlocked(st, || self.inbox.recv())
                .map_err(|_| Error::Broken("barrier queue closed"))?;
            if self.desc.state() == BarrierState::Destroyed {
                return Err(Error::Destroyed);
            }
            match delivery.msg.kind {
                MessageType::Release => return Ok(()),
                MessageType::RejectBarrier => {
                    self.mark_broken();
                    return Err(Error::Rejected("barrier server refused sync"));
                }
                MessageType::LinkLost => {
                    self.mark_broken();
                    return Err(Error::LinkLost);
                }
                other => log::trace!("barrier client ignoring {}", other),
            }
        }
    }

    fn server_phase(&self, st: &mut MutexGuard<'_, SyncState>) -> Result<()> {
        loop {
            self.drain(st)?;
            if st.net_countdown == 0 {
                return Ok(());
            }
            let delivery = MutexGuard::unlocked(st, || self.inbox.recv())
                .map_err(|_| Error::Broken("barrier queue closed"))?;
            if self.desc.state() == BarrierState::Destroyed {
                return Err(Error::Destroyed);
            }
            self.server_message(st, delivery)?;
        }
    }

    /// Apply every queued message without blocking.
    fn drain(&self, st: &mut SyncState) -> Result<()> {
        while let Ok(delivery) = self.inbox.try_recv() {
            match self.role {
                Role::Server => self.server_message(st, delivery)?,
                Role::Client { .. } => self.client_message(delivery)?,
            }
        }
        Ok(())
    }

    fn server_message(&self, st: &mut SyncState, delivery: Delivery) -> Result<()> {
        match delivery.msg.kind {
            MessageType::Enroll => {
                if st.initial_net_allowance > 0 {
                    st.initial_net_allowance -= 1;
                } else {
                    st.net_enrolled += 1;
                    st.net_countdown += 1;
                }
            }
            MessageType::Resign => {
                if st.net_enrolled == 0 || st.net_countdown == 0 {
                    return Err(Error::Network("more resignations than enrolled client ends".into()));
                }
                st.net_enrolled -= 1;
                st.net_countdown -= 1;
            }
            MessageType::Sync => {
                if st.net_countdown == 0 {
                    delivery.respond(NetworkMessage::new(
                        MessageType::RejectBarrier,
                        delivery.msg.attr2,
                        self.desc.handle(),
                    ));
                    return Err(Error::Network("more syncs than enrolled client ends".into()));
                }
                st.net_countdown -= 1;
                st.waiting.push(delivery);
            }
            MessageType::LinkLost => {
                st.net_enrolled = st.net_enrolled.saturating_sub(1);
                st.net_countdown = st.net_countdown.saturating_sub(1);
                return Err(Error::LinkLost);
            }
            other => log::trace!("barrier server ignoring {}", other),
        }
        Ok(())
    }

    fn client_message(&self, delivery: Delivery) -> Result<()> {
        match delivery.msg.kind {
            MessageType::LinkLost => {
                self.mark_broken();
                Err(Error::LinkLost)
            }
            MessageType::RejectBarrier => {
                self.mark_broken();
                Err(Error::Rejected("barrier server refused this client"))
            }
            other => {
                log::trace!("barrier client ignoring {}", other);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Enrollment
    // ========================================================================

    /// Add a local participant. Re-enrolls a resigned client end.
    pub fn enroll(&self) -> Result<()> {
        let mut st = self.sync.lock();
        let rejoin = {
            let mut state = self.desc.lock();
            match *state {
                BarrierState::ActiveServer | BarrierState::ActiveClient => false,
                BarrierState::Resigned => {
                    *state = BarrierState::ActiveClient;
                    true
                }
                BarrierState::Destroyed => return Err(Error::Destroyed),
                _ => return Err(Error::Broken("barrier")),
            }
        };
        if rejoin {
            if let Role::Client { server, peer } = &self.role {
                peer.send(
                    &self.node,
                    NetworkMessage::new(MessageType::Enroll, server.handle(), self.desc.handle()),
                    self.desc.queue(),
                );
            }
        }
        st.local_enrolled += 1;
        st.local_countdown += 1;
        Ok(())
    }

    /// Remove a local participant.
    ///
    /// Resigning the last participant of a client end leaves it `Resigned`
    /// (it may enroll again). Resigning the last participant of the server
    /// end breaks the barrier and rejects every waiting client.
    pub fn resign(&self) -> Result<()> {
        let mut st = self.sync.lock();
        match self.desc.state() {
            BarrierState::ActiveServer | BarrierState::ActiveClient => {}
            BarrierState::Resigned => return Ok(()),
            BarrierState::Destroyed => return Err(Error::Destroyed),
            _ => return Err(Error::Broken("barrier")),
        }
        if st.local_enrolled == 0 {
            return Err(Error::ProtocolMisuse("resign with no enrolled participant"));
        }

        if st.local_enrolled == 1 {
            st.local_enrolled = 0;
            st.local_countdown = 0;
            return match &self.role {
                Role::Client { server, peer } => {
                    *self.desc.lock() = BarrierState::Resigned;
                    peer.send(
                        &self.node,
                        NetworkMessage::new(MessageType::Resign, server.handle(), self.desc.handle()),
                        self.desc.queue(),
                    );
                    Ok(())
                }
                Role::Server => {
                    *self.desc.lock() = BarrierState::Broken;
                    self.node.barriers.remove(self.desc.handle(), &self.desc);
                    self.reject_waiting(&mut st);
                    self.released.notify_all();
                    Err(Error::Broken("last local participant resigned from the server end"))
                }
            };
        }

        st.local_enrolled -= 1;
        // A running network phase resets the countdown when it completes.
        if !st.net_phase {
            if st.local_countdown == 1 {
                st.perform_net_sync = true;
                self.released.notify_all();
            } else {
                st.local_countdown -= 1;
            }
        }
        Ok(())
    }

    /// Reset the number of local participants.
    pub fn reset(&self, local_enrolled: usize) -> Result<()> {
        if local_enrolled < 1 {
            return Err(Error::InvalidArgument("reset to zero participants".into()));
        }
        let mut st = self.sync.lock();
        if st.net_phase || st.local_countdown != st.local_enrolled {
            return Err(Error::ProtocolMisuse("reset while a sync is in progress"));
        }
        st.local_enrolled = local_enrolled;
        st.local_countdown = local_enrolled;
        Ok(())
    }

    /// Tear this end down.
    pub fn destroy(&self) {
        let previous = {
            let mut state = self.desc.lock();
            let previous = *state;
            if previous == BarrierState::Destroyed {
                return;
            }
            *state = BarrierState::Destroyed;
            previous
        };
        let handle = self.desc.handle();
        self.node.barriers.remove(handle, &self.desc);

        let mut st = self.sync.lock();
        match &self.role {
            Role::Server => self.reject_waiting(&mut st),
            Role::Client { server, peer } => {
                if previous == BarrierState::ActiveClient {
                    peer.send(
                        &self.node,
                        NetworkMessage::new(MessageType::Resign, server.handle(), handle),
                        self.desc.queue(),
                    );
                }
                if let Some(link) = peer.link() {
                    link.deregister_barrier(handle);
                }
            }
        }
        // Wakes a network phase blocked on the queue.
        self.desc.deliver(NetworkMessage::new(MessageType::RejectBarrier, handle, NO_ATTR), None);
        self.released.notify_all();
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_active(&self) -> Result<()> {
        match self.desc.state() {
            BarrierState::ActiveServer | BarrierState::ActiveClient => Ok(()),
            BarrierState::Resigned => Err(Error::ProtocolMisuse("sync on a resigned barrier")),
            BarrierState::Destroyed => Err(Error::Destroyed),
            _ => Err(Error::Broken("barrier")),
        }
    }

    fn mark_broken(&self) {
        {
            let mut state = self.desc.lock();
            if *state == BarrierState::Destroyed {
                return;
            }
            *state = BarrierState::Broken;
        }
        let handle = self.desc.handle();
        self.node.barriers.remove(handle, &self.desc);
        if let Role::Client { peer, .. } = &self.role {
            if let Some(link) = peer.link() {
                link.deregister_barrier(handle);
            }
        }
    }

    /// Answer every pending and queued SYNC with REJECT_BARRIER.
    fn reject_waiting(&self, st: &mut SyncState) {
        let own = self.desc.handle();
        let queued: Vec<Delivery> = self.inbox.try_iter().collect();
        for delivery in st.waiting.drain(..).chain(queued) {
            if delivery.msg.kind == MessageType::Sync {
                delivery.respond(NetworkMessage::new(
                    MessageType::RejectBarrier,
                    delivery.msg.attr2,
                    own,
                ));
            }
        }
    }
}

impl Drop for NetBarrier {
    fn drop(&mut self) {
        self.destroy();
    }
}
