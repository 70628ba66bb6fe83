// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::alt::{AltGuard, Guard};
use crate::codec::Codec;
use crate::descriptor::{ConnectionDescriptor, ConnectionState, Delivery, ReplyPath};
use crate::error::{Error, Result};
use crate::location::ConnectionLocation;
use crate::node::NodeContext;
use crate::protocol::{MessageType, NetworkMessage};
use crate::registry::Handle;

/// A client end as seen from the server: its handle and the path back to it.
struct Session {
    handle: Handle,
    reply: ReplyPath,
}

impl Session {
    fn of(delivery: &Delivery) -> Option<Self> {
        delivery.reply.clone().map(|reply| Session {
            handle: delivery.msg.attr2,
            reply,
        })
    }

    /// True when `delivery` was sent by this client.
    fn sent(&self, delivery: &Delivery) -> bool {
        delivery.msg.attr2 == self.handle
            && delivery
                .reply
                .as_ref()
                .is_some_and(|reply| reply.same_peer(&self.reply))
    }
}

/// Server end of a connection.
pub struct NetConnectionServer<Req, Rep, C> {
    node: Arc<NodeContext>,
    desc: Arc<ConnectionDescriptor>,
    /// Traffic of the open session
    inbox: Receiver<Delivery>,
    /// OPEN requests from clients waiting for a session
    opens: Receiver<Delivery>,
    location: ConnectionLocation,
    session: Option<Session>,
    /// Clients that gave up while their OPEN was still queued
    abandoned: Vec<Session>,
    codec: C,
    _marker: PhantomData<fn(&Rep) -> Req>,
}

impl<Req, Rep, C> NetConnectionServer<Req, Rep, C>
where
    C: Codec<Req> + Codec<Rep>,
{
    pub(crate) fn create(node: &Arc<NodeContext>, handle: Option<Handle>, codec: C) -> Result<Self> {
        let (desc, inbox, opens) = ConnectionDescriptor::server();
        let handle = match handle {
            Some(handle) => {
                node.connections.create_at(handle, Arc::clone(&desc))?;
                handle
            }
            None => node.connections.create(Arc::clone(&desc)),
        };
        log::debug!("connection server {} created", handle);
        Ok(Self {
            node: Arc::clone(node),
            location: ConnectionLocation::new(node.id.clone(), handle),
            desc,
            inbox,
            opens,
            session: None,
            abandoned: Vec::new(),
            codec,
            _marker: PhantomData,
        })
    }

    /// Address clients connect to.
    pub fn location(&self) -> &ConnectionLocation {
        &self.location
    }

    /// Block for the next request.
    ///
    /// With no open session this accepts the next client's OPEN; otherwise
    /// it waits for the current client's next REQUEST.
    pub fn request(&mut self) -> Result<Req> {
        let delivery = match self.desc.state() {
            ConnectionState::ServerClosed => self.accept()?,
            ConnectionState::ServerOpen => self.next_request()?,
            ConnectionState::ServerReceived => {
                return Err(Error::ProtocolMisuse("request while a reply is owed"))
            }
            ConnectionState::Destroyed => return Err(Error::Destroyed),
            _ => return Err(Error::Broken("connection server")),
        };

        *self.desc.lock() = ConnectionState::ServerReceived;
        if matches!(delivery.msg.kind, MessageType::Open | MessageType::Request) {
            delivery.respond(NetworkMessage::new(
                MessageType::RequestAck,
                delivery.msg.attr2,
                self.desc.handle(),
            ));
        }
        Codec::<Req>::decode(&mut self.codec, &delivery.msg.data)
    }

    /// Answer the pending request and keep the session open.
    pub fn reply(&mut self, value: &Rep) -> Result<()> {
        self.send_reply(MessageType::Reply, value, ConnectionState::ServerOpen)
    }

    /// Answer the pending request and close the session.
    pub fn reply_and_close(&mut self, value: &Rep) -> Result<()> {
        self.send_reply(MessageType::ReplyAndClose, value, ConnectionState::ServerClosed)
    }

    /// True while a client holds the session.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn send_reply(&mut self, kind: MessageType, value: &Rep, next: ConnectionState) -> Result<()> {
        if self.desc.state() != ConnectionState::ServerReceived {
            return Err(Error::ProtocolMisuse("reply without a pending request"));
        }
        let data = Codec::<Rep>::encode(&mut self.codec, value)?;
        let Some(session) = &self.session else {
            return Err(Error::ProtocolMisuse("reply without a session"));
        };
        session.reply.send(NetworkMessage::with_data(
            kind,
            session.handle,
            self.desc.handle(),
            data,
        ));

        loop {
            let delivery = self
                .inbox
                .recv()
                .map_err(|_| Error::Broken("connection queue closed"))?;
            match delivery.msg.kind {
                MessageType::ReplyAck if self.from_session(&delivery) => break,
                MessageType::Request | MessageType::AsyncRequest => self.refuse_stranger(&delivery),
                _ => self.session_event(delivery)?,
            }
        }

        if next == ConnectionState::ServerClosed {
            self.close_session();
        } else {
            *self.desc.lock() = next;
        }
        Ok(())
    }

    /// Take the next OPEN and make its sender the session client.
    fn accept(&mut self) -> Result<Delivery> {
        loop {
            let delivery = self
                .opens
                .recv()
                .map_err(|_| Error::Broken("connection queue closed"))?;
            if self.desc.state() == ConnectionState::Destroyed {
                return Err(Error::Destroyed);
            }
            // Leftovers from a previous session; only rejects still matter.
            while let Ok(stale) = self.inbox.try_recv() {
                if stale.msg.kind == MessageType::RejectConnection {
                    self.abandoned.extend(Session::of(&stale));
                }
            }

            if let Some(pos) = self.abandoned.iter().position(|gone| gone.sent(&delivery)) {
                self.abandoned.swap_remove(pos);
                log::debug!(
                    "connection server {} skipping abandoned OPEN from {}",
                    self.desc.handle(),
                    delivery.msg.attr2
                );
                continue;
            }

            let Some(session) = Session::of(&delivery) else {
                return Err(Error::Network("OPEN without a reply path".into()));
            };
            if let Some(link) = session.reply.link() {
                link.register_connection(self.desc.handle(), self.desc.queue());
            }
            log::debug!(
                "connection server {} opened for client {}",
                self.desc.handle(),
                session.handle
            );
            self.session = Some(session);
            *self.desc.lock() = ConnectionState::ServerOpen;
            return Ok(delivery);
        }
    }

    fn next_request(&mut self) -> Result<Delivery> {
        loop {
            let delivery = self
                .inbox
                .recv()
                .map_err(|_| Error::Broken("connection queue closed"))?;
            match delivery.msg.kind {
                MessageType::Request | MessageType::AsyncRequest => {
                    if self.from_session(&delivery) {
                        return Ok(delivery);
                    }
                    self.refuse_stranger(&delivery);
                }
                _ => self.session_event(delivery)?,
            }
        }
    }

    fn from_session(&self, delivery: &Delivery) -> bool {
        self.session.as_ref().is_some_and(|s| s.sent(delivery))
    }

    /// Apply a link loss or reject seen while a session is open.
    ///
    /// Only events concerning the session client end it; a reject from any
    /// other client is remembered so its queued OPEN is skipped later.
    fn session_event(&mut self, delivery: Delivery) -> Result<()> {
        match delivery.msg.kind {
            MessageType::LinkLost => {
                let session_link_down = self
                    .session
                    .as_ref()
                    .and_then(|s| s.reply.link())
                    .is_some_and(|link| !link.is_connected());
                if session_link_down {
                    self.close_session();
                    return Err(Error::LinkLost);
                }
                log::trace!("connection server {} ignoring stale LINK_LOST", self.desc.handle());
            }
            MessageType::RejectConnection => {
                if self.from_session(&delivery) {
                    self.close_session();
                    return Err(Error::Rejected("connection client is gone"));
                }
                self.abandoned.extend(Session::of(&delivery));
            }
            other => log::trace!("connection server ignoring {}", other),
        }
        Ok(())
    }

    /// Refuse a REQUEST from a client that does not hold the session.
    fn refuse_stranger(&self, delivery: &Delivery) {
        log::debug!(
            "connection server {} refusing request from non-session client {}",
            self.desc.handle(),
            delivery.msg.attr2
        );
        delivery.respond(NetworkMessage::new(
            MessageType::RejectConnection,
            delivery.msg.attr2,
            self.desc.handle(),
        ));
    }
}

impl<Req, Rep, C> NetConnectionServer<Req, Rep, C> {
    pub fn state(&self) -> ConnectionState {
        self.desc.state()
    }

    /// Tear the server down, refusing every waiting client.
    pub fn destroy(&mut self) {
        {
            let mut state = self.desc.lock();
            if *state == ConnectionState::Destroyed {
                return;
            }
            *state = ConnectionState::Destroyed;
        }
        let handle = self.desc.handle();
        self.node.connections.remove(handle, &self.desc);

        let refuse = |delivery: &Delivery| {
            if matches!(
                delivery.msg.kind,
                MessageType::Open
                    | MessageType::AsyncOpen
                    | MessageType::Request
                    | MessageType::AsyncRequest
            ) {
                delivery.respond(NetworkMessage::new(
                    MessageType::RejectConnection,
                    delivery.msg.attr2,
                    handle,
                ));
            }
        };
        self.opens.try_iter().for_each(|d| refuse(&d));
        self.inbox.try_iter().for_each(|d| refuse(&d));

        if let Some(session) = self.session.take() {
            if let Some(link) = session.reply.link() {
                link.deregister_connection(handle);
            }
        }
    }

    /// Drop the session client and return to `ServerClosed`.
    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(link) = session.reply.link() {
                link.deregister_connection(self.desc.handle());
            }
        }
        let mut state = self.desc.lock();
        if *state != ConnectionState::Destroyed {
            *state = ConnectionState::ServerClosed;
        }
    }
}

impl<Req, Rep, C> Guard for NetConnectionServer<Req, Rep, C> {
    fn alt_guard(&self) -> AltGuard<'_> {
        match self.desc.state() {
            ConnectionState::ServerClosed => AltGuard::new(&self.opens, false),
            ConnectionState::ServerOpen => AltGuard::new(&self.inbox, false),
            // A reply is owed or the server is gone; request() fails at once.
            _ => AltGuard::new(&self.inbox, true),
        }
    }
}

impl<Req, Rep, C> Drop for NetConnectionServer<Req, Rep, C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
