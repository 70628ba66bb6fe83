// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reading end of a networked channel.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::alt::{AltGuard, Guard};
use crate::codec::Codec;
use crate::descriptor::{ChannelDescriptor, ChannelState, Delivery};
use crate::error::{Error, Result};
use crate::location::ChannelLocation;
use crate::node::{InputOptions, NodeContext};
use crate::protocol::{MessageType, NetworkMessage};

/// Channel input fed by any number of outputs, local or remote.
pub struct NetChannelInput<T, C> {
    node: Arc<NodeContext>,
    desc: Arc<ChannelDescriptor>,
    inbox: Receiver<Delivery>,
    location: ChannelLocation,
    codec: C,
    /// Message taken by `start_read` and not yet acknowledged
    extended: Option<Delivery>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: Codec<T>> NetChannelInput<T, C> {
    pub(crate) fn create(node: &Arc<NodeContext>, options: InputOptions, codec: C) -> Result<Self> {
        let (desc, inbox) = ChannelDescriptor::new(ChannelState::ActiveInput, options.immunity);
        let handle = match options.handle {
            Some(handle) => {
                node.channels.create_at(handle, Arc::clone(&desc))?;
                handle
            }
            None => node.channels.create(Arc::clone(&desc)),
        };
        log::debug!("channel input {} created", handle);
        Ok(Self {
            node: Arc::clone(node),
            location: ChannelLocation::new(node.id.clone(), handle),
            desc,
            inbox,
            codec,
            extended: None,
            _marker: PhantomData,
        })
    }

    /// Address writers use to reach this input.
    pub fn location(&self) -> &ChannelLocation {
        &self.location
    }

    /// Block for the next value and acknowledge it.
    pub fn read(&mut self) -> Result<T> {
        if self.extended.is_some() {
            return Err(Error::ProtocolMisuse("read called during an extended read"));
        }
        let delivery = self.next_message()?;
        let value = self.codec.decode(&delivery.msg.data);
        self.acknowledge(&delivery);
        value
    }

    /// Like [`read`](Self::read), giving up after `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time; no writer was touched.
    pub fn read_timeout(&mut self, timeout: Duration) -> Result<Option<T>> {
        if self.extended.is_some() {
            return Err(Error::ProtocolMisuse("read called during an extended read"));
        }
        let Some(delivery) = self.next_message_until(Some(Instant::now() + timeout))? else {
            return Ok(None);
        };
        let value = self.codec.decode(&delivery.msg.data);
        self.acknowledge(&delivery);
        value.map(Some)
    }

    /// Block for the next value without acknowledging it.
    ///
    /// The writer stays blocked until [`end_read`](Self::end_read).
    pub fn start_read(&mut self) -> Result<T> {
        if self.extended.is_some() {
            return Err(Error::ProtocolMisuse(
                "start_read called twice without end_read",
            ));
        }
        let delivery = self.next_message()?;
        match self.codec.decode(&delivery.msg.data) {
            Ok(value) => {
                self.extended = Some(delivery);
                Ok(value)
            }
            Err(e) => {
                self.acknowledge(&delivery);
                Err(e)
            }
        }
    }

    /// Release the writer held by [`start_read`](Self::start_read).
    pub fn end_read(&mut self) -> Result<()> {
        let delivery = self
            .extended
            .take()
            .ok_or(Error::ProtocolMisuse("end_read without start_read"))?;
        self.acknowledge(&delivery);
        Ok(())
    }

    /// True if a read would not block.
    pub fn pending(&self) -> bool {
        self.desc.lock().state == ChannelState::Poisoned || !self.inbox.is_empty()
    }
}

impl<T, C> NetChannelInput<T, C> {
    /// Poison the channel from the reading side.
    ///
    /// Writers blocked on this input, including one held by an extended read,
    /// are answered with POISON.
    pub fn poison(&mut self, strength: i32) {
        {
            let mut data = self.desc.lock();
            if matches!(data.state, ChannelState::Destroyed | ChannelState::Broken)
                || strength <= data.poison_level
            {
                return;
            }
            data.raise_poison(strength);
            if strength <= data.immunity_level {
                return;
            }
            data.state = ChannelState::Poisoned;
        }
        log::debug!("channel input {} poisoned ({})", self.desc.handle(), strength);
        if let Some(held) = self.extended.take() {
            self.answer(&held, MessageType::Poison, strength);
        }
        self.drain_poisoned();
    }

    /// Tear the endpoint down, rejecting every queued and held writer.
    pub fn destroy(&mut self) {
        {
            let mut data = self.desc.lock();
            if data.state == ChannelState::Destroyed {
                return;
            }
            data.state = ChannelState::Destroyed;
        }
        self.node.channels.remove(self.desc.handle(), &self.desc);

        let handle = self.desc.handle();
        if let Some(held) = self.extended.take() {
            self.answer(&held, MessageType::RejectChannel, handle);
        }
        while let Ok(queued) = self.inbox.try_recv() {
            if matches!(queued.msg.kind, MessageType::Send | MessageType::AsyncSend) {
                self.answer(&queued, MessageType::RejectChannel, handle);
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.desc.lock().state
    }

    fn next_message(&mut self) -> Result<Delivery> {
        self.next_message_until(None)?
            .ok_or(Error::Broken("delivery queue closed"))
    }

    /// Next SEND, or `None` once `deadline` passes.
    fn next_message_until(&mut self, deadline: Option<Instant>) -> Result<Option<Delivery>> {
        self.check_state()?;
        loop {
            let received = match deadline {
                None => self.inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(deadline) => self.inbox.recv_deadline(deadline),
            };
            let delivery = match received {
                Ok(delivery) => delivery,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Broken("delivery queue closed"))
                }
            };
            match delivery.msg.kind {
                MessageType::Send | MessageType::AsyncSend => return Ok(Some(delivery)),
                MessageType::Poison => {
                    {
                        let mut data = self.desc.lock();
                        data.raise_poison(delivery.msg.attr2);
                        data.state = ChannelState::Poisoned;
                    }
                    return Err(Error::Poisoned(self.drain_poisoned()));
                }
                other => log::trace!("channel input ignoring {}", other),
            }
        }
    }

    fn check_state(&mut self) -> Result<()> {
        let state = self.desc.lock().state;
        match state {
            ChannelState::ActiveInput => Ok(()),
            ChannelState::Poisoned => Err(Error::Poisoned(self.drain_poisoned())),
            ChannelState::Destroyed => Err(Error::Destroyed),
            _ => Err(Error::Broken("channel input")),
        }
    }

    /// Answer every queued writer with POISON; returns the final level.
    fn drain_poisoned(&mut self) -> i32 {
        while let Ok(queued) = self.inbox.try_recv() {
            match queued.msg.kind {
                MessageType::Poison => self.desc.lock().raise_poison(queued.msg.attr2),
                MessageType::Send | MessageType::AsyncSend => {
                    let level = self.desc.lock().poison_level;
                    self.answer(&queued, MessageType::Poison, level);
                }
                _ => {}
            }
        }
        self.desc.lock().poison_level
    }

    fn acknowledge(&self, delivery: &Delivery) {
        if delivery.msg.kind == MessageType::Send {
            self.answer(delivery, MessageType::Ack, self.desc.handle());
        }
    }

    fn answer(&self, delivery: &Delivery, kind: MessageType, attr2: i32) {
        delivery.respond(NetworkMessage::new(kind, delivery.msg.attr2, attr2));
    }
}

impl<T, C> Guard for NetChannelInput<T, C> {
    fn alt_guard(&self) -> AltGuard<'_> {
        // Any state but active fails a read at once.
        let settled =
            self.extended.is_some() || self.desc.lock().state != ChannelState::ActiveInput;
        AltGuard::new(&self.inbox, settled)
    }
}

impl<T, C> Drop for NetChannelInput<T, C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
