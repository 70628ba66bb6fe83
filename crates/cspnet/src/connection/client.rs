// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::alt::{AltGuard, Guard};
use crate::codec::Codec;
use crate::descriptor::{ConnectionDescriptor, ConnectionState, Delivery};
use crate::error::{Error, Result};
use crate::link::peer::Peer;
use crate::location::ConnectionLocation;
use crate::node::NodeContext;
use crate::protocol::{MessageType, NetworkMessage};

/// Client end of a connection.
///
/// `request` blocks until the server has accepted the request; `reply`
/// blocks for the answer. The session stays open until the server replies
/// with [`reply_and_close`](super::NetConnectionServer::reply_and_close).
pub struct NetConnectionClient<Req, Rep, C> {
    node: Arc<NodeContext>,
    desc: Arc<ConnectionDescriptor>,
    inbox: Receiver<Delivery>,
    peer: Peer,
    server: ConnectionLocation,
    location: ConnectionLocation,
    codec: C,
    _marker: PhantomData<fn(&Req) -> Rep>,
}

impl<Req, Rep, C> NetConnectionClient<Req, Rep, C>
where
    C: Codec<Req> + Codec<Rep>,
{
    pub(crate) fn create(
        node: &Arc<NodeContext>,
        server: &ConnectionLocation,
        codec: C,
    ) -> Result<Self> {
        let peer = Peer::resolve(node, server.node_id())?;
        let (desc, inbox) = ConnectionDescriptor::client();
        let handle = node.connections.create(Arc::clone(&desc));
        if let Some(link) = peer.link() {
            link.register_connection(handle, desc.queue());
        }
        log::debug!("connection client {} -> {}", handle, server);
        Ok(Self {
            node: Arc::clone(node),
            location: ConnectionLocation::new(node.id.clone(), handle),
            desc,
            inbox,
            peer,
            server: server.clone(),
            codec,
            _marker: PhantomData,
        })
    }

    /// Send a request, opening the session if it is closed.
    pub fn request(&mut self, value: &Req) -> Result<()> {
        self.check_can_request()?;
        let data = Codec::<Req>::encode(&mut self.codec, value)?;
        let kind = {
            let mut state = self.desc.lock();
            let kind = match *state {
                ConnectionState::ClientClosed => MessageType::Open,
                ConnectionState::ClientOpen => MessageType::Request,
                ConnectionState::ClientRequested => {
                    return Err(Error::ProtocolMisuse("request while a reply is outstanding"))
                }
                ConnectionState::Destroyed => return Err(Error::Destroyed),
                _ => return Err(Error::Broken("connection client")),
            };
            *state = ConnectionState::ClientRequested;
            kind
        };
        self.peer.send(
            &self.node,
            NetworkMessage::with_data(kind, self.server.handle(), self.desc.handle(), data),
            self.desc.queue(),
        );

        loop {
            let delivery = self.next_message()?;
            match delivery.msg.kind {
                MessageType::RequestAck => return Ok(()),
                other => log::trace!("connection client ignoring {} before ack", other),
            }
        }
    }

    /// Block for the server's answer to the last request.
    pub fn reply(&mut self) -> Result<Rep> {
        if self.desc.state() != ConnectionState::ClientRequested {
            return Err(Error::ProtocolMisuse("reply without a pending request"));
        }
        loop {
            let delivery = self.next_message()?;
            let next = match delivery.msg.kind {
                MessageType::Reply | MessageType::AsyncReply => ConnectionState::ClientOpen,
                MessageType::ReplyAndClose | MessageType::AsyncReplyAndClose => {
                    ConnectionState::ClientClosed
                }
                other => {
                    log::trace!("connection client ignoring {} while awaiting reply", other);
                    continue;
                }
            };
            *self.desc.lock() = next;
            if matches!(delivery.msg.kind, MessageType::Reply | MessageType::ReplyAndClose) {
                self.peer.send(
                    &self.node,
                    NetworkMessage::new(MessageType::ReplyAck, delivery.msg.attr2, self.desc.handle()),
                    self.desc.queue(),
                );
            }
            return Codec::<Rep>::decode(&mut self.codec, &delivery.msg.data);
        }
    }

    /// True while the server keeps the session open.
    pub fn is_open(&self) -> bool {
        self.desc.state() == ConnectionState::ClientOpen
    }

    /// Location of this client end.
    pub fn location(&self) -> &ConnectionLocation {
        &self.location
    }

    /// Location of the server.
    pub fn server_location(&self) -> &ConnectionLocation {
        &self.server
    }

    fn check_can_request(&self) -> Result<()> {
        match self.desc.state() {
            ConnectionState::ClientClosed | ConnectionState::ClientOpen => Ok(()),
            ConnectionState::ClientRequested => {
                Err(Error::ProtocolMisuse("request while a reply is outstanding"))
            }
            ConnectionState::Destroyed => Err(Error::Destroyed),
            _ => Err(Error::Broken("connection client")),
        }
    }

    /// Next reply-bearing message; rejection and link loss break the client.
    fn next_message(&mut self) -> Result<Delivery> {
        let delivery = self
            .inbox
            .recv()
            .map_err(|_| Error::Broken("connection queue closed"))?;
        match delivery.msg.kind {
            MessageType::RejectConnection => {
                self.mark_broken();
                Err(Error::Rejected("connection server refused the request"))
            }
            MessageType::LinkLost => {
                self.mark_broken();
                Err(Error::LinkLost)
            }
            _ => Ok(delivery),
        }
    }
}

impl<Req, Rep, C> NetConnectionClient<Req, Rep, C> {
    pub fn state(&self) -> ConnectionState {
        self.desc.state()
    }

    /// Tear this end down.
    ///
    /// A session still open is abandoned; the server is told with
    /// REJECT_CONNECTION so it can take the next client.
    pub fn destroy(&mut self) {
        let previous = {
            let mut state = self.desc.lock();
            let previous = *state;
            if previous == ConnectionState::Destroyed {
                return;
            }
            *state = ConnectionState::Destroyed;
            previous
        };
        if matches!(
            previous,
            ConnectionState::ClientRequested | ConnectionState::ClientOpen
        ) {
            self.peer.send(
                &self.node,
                NetworkMessage::new(
                    MessageType::RejectConnection,
                    self.server.handle(),
                    self.desc.handle(),
                ),
                self.desc.queue(),
            );
        }
        self.deregister();
    }

    fn mark_broken(&mut self) {
        *self.desc.lock() = ConnectionState::Broken;
        self.deregister();
    }

    fn deregister(&self) {
        let handle = self.desc.handle();
        self.node.connections.remove(handle, &self.desc);
        if let Some(link) = self.peer.link() {
            link.deregister_connection(handle);
        }
    }
}

impl<Req, Rep, C> Guard for NetConnectionClient<Req, Rep, C> {
    fn alt_guard(&self) -> AltGuard<'_> {
        // Only an outstanding request has a reply to wait for.
        let settled = self.desc.state() != ConnectionState::ClientRequested;
        AltGuard::new(&self.inbox, settled)
    }
}

impl<Req, Rep, C> Drop for NetConnectionClient<Req, Rep, C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
