// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writing end of a networked channel.

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::codec::Codec;
use crate::descriptor::{ChannelDescriptor, ChannelState, Delivery};
use crate::error::{Error, Result};
use crate::link::peer::Peer;
use crate::location::ChannelLocation;
use crate::node::NodeContext;
use crate::protocol::{MessageType, NetworkMessage};

/// Channel output bound to one remote (or local) input.
///
/// `write` blocks until the reader acknowledges; `async_write` returns as
/// soon as the message is queued. Failures reported for an asynchronous
/// write surface on the next call.
pub struct NetChannelOutput<T, C> {
    node: Arc<NodeContext>,
    desc: Arc<ChannelDescriptor>,
    replies: Receiver<Delivery>,
    peer: Peer,
    target: ChannelLocation,
    codec: C,
    _marker: PhantomData<fn(&T)>,
}

impl<T, C: Codec<T>> NetChannelOutput<T, C> {
    pub(crate) fn create(
        node: &Arc<NodeContext>,
        target: &ChannelLocation,
        immunity: i32,
        codec: C,
    ) -> Result<Self> {
        let peer = Peer::resolve(node, target.node_id())?;
        let (desc, replies) = ChannelDescriptor::new(ChannelState::ActiveOutput, immunity);
        let handle = node.channels.create(Arc::clone(&desc));
        if let Some(link) = peer.link() {
            link.register_channel(handle, desc.queue());
        }
        log::debug!("channel output {} -> {}", handle, target);
        Ok(Self {
            node: Arc::clone(node),
            desc,
            replies,
            peer,
            target: target.clone(),
            codec,
            _marker: PhantomData,
        })
    }

    /// Location of the input this output writes to.
    pub fn location(&self) -> &ChannelLocation {
        &self.target
    }

    /// Synchronous write: returns once the reader has taken the value.
    pub fn write(&mut self, value: &T) -> Result<()> {
        self.check_state()?;
        self.drain_replies()?;
        let data = self.codec.encode(value)?;
        self.transmit(MessageType::Send, data);
        let reply = self
            .replies
            .recv()
            .map_err(|_| Error::Broken("reply queue closed"))?;
        self.handle_reply(reply)
    }

    /// Fire-and-forget write.
    pub fn async_write(&mut self, value: &T) -> Result<()> {
        self.check_state()?;
        self.drain_replies()?;
        let data = self.codec.encode(value)?;
        self.transmit(MessageType::AsyncSend, data);
        Ok(())
    }

    /// Poison the channel with `strength`.
    ///
    /// Ignored when the endpoint is destroyed or broken, or when `strength`
    /// does not exceed the current poison level.
    pub fn poison(&mut self, strength: i32) {
        let forward = {
            let mut data = self.desc.lock();
            if matches!(data.state, ChannelState::Destroyed | ChannelState::Broken)
                || strength <= data.poison_level
            {
                return;
            }
            data.raise_poison(strength);
            if strength > data.immunity_level {
                data.state = ChannelState::Poisoned;
                true
            } else {
                false
            }
        };
        if forward {
            log::debug!("channel output {} poisoned ({})", self.desc.handle(), strength);
            self.peer.send(
                &self.node,
                NetworkMessage::new(MessageType::Poison, self.target.handle(), strength),
                self.desc.queue(),
            );
        }
    }

    /// Tear the endpoint down. Further operations fail with `Destroyed`.
    pub fn destroy(&mut self) {
        {
            let mut data = self.desc.lock();
            if data.state == ChannelState::Destroyed {
                return;
            }
            data.state = ChannelState::Destroyed;
        }
        self.deregister();
    }

    pub fn state(&self) -> ChannelState {
        self.desc.lock().state
    }

    fn transmit(&self, kind: MessageType, data: Vec<u8>) {
        let msg = NetworkMessage::with_data(kind, self.target.handle(), self.desc.handle(), data);
        self.peer.send(&self.node, msg, self.desc.queue());
    }

    fn check_state(&self) -> Result<()> {
        let mut data = self.desc.lock();
        match data.state {
            ChannelState::ActiveOutput => Ok(()),
            ChannelState::Destroyed => Err(Error::Destroyed),
            ChannelState::Poisoned => {
                // A stronger poison may have been forwarded since.
                while let Ok(stray) = self.replies.try_recv() {
                    if stray.msg.kind == MessageType::Poison {
                        data.raise_poison(stray.msg.attr2);
                    }
                }
                Err(Error::Poisoned(data.poison_level))
            }
            _ => Err(Error::Broken("channel output")),
        }
    }

    /// Consume replies left over from earlier asynchronous writes.
    fn drain_replies(&mut self) -> Result<()> {
        while let Ok(stray) = self.replies.try_recv() {
            self.handle_reply(stray)?;
        }
        Ok(())
    }

    fn handle_reply(&mut self, reply: Delivery) -> Result<()> {
        match reply.msg.kind {
            MessageType::Ack => Ok(()),
            MessageType::RejectChannel => {
                self.mark_broken();
                Err(Error::Rejected("channel input refused the message"))
            }
            MessageType::LinkLost => {
                self.mark_broken();
                Err(Error::LinkLost)
            }
            MessageType::Poison => {
                let mut data = self.desc.lock();
                data.raise_poison(reply.msg.attr2);
                data.state = ChannelState::Poisoned;
                Err(Error::Poisoned(data.poison_level))
            }
            other => Err(Error::Network(format!(
                "unexpected {} on channel output",
                other
            ))),
        }
    }

    fn mark_broken(&mut self) {
        self.desc.lock().state = ChannelState::Broken;
        self.deregister();
    }
}

impl<T, C> NetChannelOutput<T, C> {
    fn deregister(&self) {
        let handle = self.desc.handle();
        self.node.channels.remove(handle, &self.desc);
        if let Some(link) = self.peer.link() {
            link.deregister_channel(handle);
        }
    }
}

impl<T, C> Drop for NetChannelOutput<T, C> {
    fn drop(&mut self) {
        self.desc.lock().state = ChannelState::Destroyed;
        self.deregister();
    }
}
