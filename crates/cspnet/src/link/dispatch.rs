// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message routing against descriptor state.
//!
//! Used by every link receive loop and by local (same-node) senders, so a
//! message addressed to this node is judged by the same rules wherever it
//! came from. Each decision is taken under the target descriptor's lock; the
//! registry lock is released before that lock is taken.

use std::sync::Arc;

use crate::descriptor::{
    BarrierDescriptor, BarrierState, ChannelState, ConnectionState, ReplyPath,
};
use crate::node::NodeContext;
use crate::protocol::{MessageType, NetworkMessage};

/// Route one message addressed to this node.
///
/// `enrolled` is the receive loop's record of barrier servers that accepted
/// an ENROLL over its link; local senders pass `None`.
pub(crate) fn route(
    node: &NodeContext,
    msg: NetworkMessage,
    reply: ReplyPath,
    enrolled: Option<&mut Vec<Arc<BarrierDescriptor>>>,
) {
    use MessageType::*;
    match msg.kind {
        Send | AsyncSend => route_send(node, msg, reply),
        Ack | RejectChannel => route_to_output(node, msg),
        Poison => route_poison(node, msg),

        Enroll => route_enroll(node, msg, reply, enrolled),
        Resign => route_resign(node, msg, enrolled),
        Sync => route_sync(node, msg, reply),
        Release | RejectBarrier => route_to_barrier_client(node, msg),

        Open | AsyncOpen => route_open(node, msg, reply),
        Request | AsyncRequest => route_request(node, msg, reply),
        Reply | AsyncReply | ReplyAndClose | AsyncReplyAndClose => route_reply(node, msg, reply),
        RequestAck => route_request_ack(node, msg),
        ReplyAck | OpenAck => route_reply_ack(node, msg, reply),
        RejectConnection => route_connection_reject(node, msg, reply),

        Moved | Arrived => log::debug!("mobility message {} ignored", msg.kind),
        LinkLost => log::warn!("LINK_LOST received from a peer; ignored"),
    }
}

fn reject(reply: &ReplyPath, kind: MessageType, msg: &NetworkMessage) {
    reply.send(NetworkMessage::new(kind, msg.attr2, msg.attr1));
}

// ============================================================================
// Channels
// ============================================================================

fn route_send(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    let Some(desc) = node.channels.get(msg.attr1) else {
        log::debug!("send to unknown channel {} rejected", msg.attr1);
        reject(&reply, MessageType::RejectChannel, &msg);
        return;
    };
    let data = desc.lock();
    match data.state {
        ChannelState::ActiveInput | ChannelState::Moving | ChannelState::Moved => {
            desc.deliver(msg, Some(reply));
        }
        ChannelState::Poisoned => {
            reply.send(NetworkMessage::new(
                MessageType::Poison,
                msg.attr2,
                data.poison_level,
            ));
        }
        _ => reject(&reply, MessageType::RejectChannel, &msg),
    }
}

fn route_to_output(node: &NodeContext, msg: NetworkMessage) {
    if let Some(desc) = node.channels.get(msg.attr1) {
        let data = desc.lock();
        if data.state == ChannelState::ActiveOutput {
            desc.deliver(msg, None);
        }
    }
}

fn route_poison(node: &NodeContext, msg: NetworkMessage) {
    let Some(desc) = node.channels.get(msg.attr1) else {
        return;
    };
    let data = desc.lock();
    let strength = msg.attr2;
    // An output's immunity records the reader's; it only limits poison sent.
    let forward = match data.state {
        ChannelState::ActiveInput => strength > data.immunity_level,
        ChannelState::ActiveOutput | ChannelState::Poisoned => strength > data.poison_level,
        _ => false,
    };
    if forward {
        desc.deliver(msg, None);
    }
}

// ============================================================================
// Barriers
// ============================================================================

fn route_enroll(
    node: &NodeContext,
    msg: NetworkMessage,
    reply: ReplyPath,
    enrolled: Option<&mut Vec<Arc<BarrierDescriptor>>>,
) {
    let Some(desc) = node.barriers.get(msg.attr1) else {
        reject(&reply, MessageType::RejectBarrier, &msg);
        return;
    };
    let state = desc.lock();
    if *state == BarrierState::ActiveServer {
        desc.deliver(msg, Some(reply));
        if let Some(list) = enrolled {
            list.push(Arc::clone(&desc));
        }
    } else {
        reject(&reply, MessageType::RejectBarrier, &msg);
    }
}

fn route_resign(
    node: &NodeContext,
    msg: NetworkMessage,
    enrolled: Option<&mut Vec<Arc<BarrierDescriptor>>>,
) {
    let Some(desc) = node.barriers.get(msg.attr1) else {
        return;
    };
    let state = desc.lock();
    if *state != BarrierState::ActiveServer {
        return;
    }
    match enrolled {
        Some(list) => {
            if let Some(pos) = list.iter().position(|b| Arc::ptr_eq(b, &desc)) {
                list.swap_remove(pos);
                desc.deliver(msg, None);
            }
        }
        None => desc.deliver(msg, None),
    }
}

fn route_sync(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    let Some(desc) = node.barriers.get(msg.attr1) else {
        reject(&reply, MessageType::RejectBarrier, &msg);
        return;
    };
    let state = desc.lock();
    if *state == BarrierState::ActiveServer {
        desc.deliver(msg, Some(reply));
    } else {
        reject(&reply, MessageType::RejectBarrier, &msg);
    }
}

fn route_to_barrier_client(node: &NodeContext, msg: NetworkMessage) {
    if let Some(desc) = node.barriers.get(msg.attr1) {
        let state = desc.lock();
        if *state == BarrierState::ActiveClient {
            desc.deliver(msg, None);
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

fn route_open(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    let Some(desc) = node.connections.get(msg.attr1) else {
        reject(&reply, MessageType::RejectConnection, &msg);
        return;
    };
    let state = desc.lock();
    if state.is_server() {
        desc.deliver_open(msg, Some(reply));
    } else {
        reject(&reply, MessageType::RejectConnection, &msg);
    }
}

fn route_request(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    let Some(desc) = node.connections.get(msg.attr1) else {
        reject(&reply, MessageType::RejectConnection, &msg);
        return;
    };
    let state = desc.lock();
    if matches!(
        *state,
        ConnectionState::ServerOpen | ConnectionState::ServerReceived
    ) {
        desc.deliver(msg, Some(reply));
    } else {
        reject(&reply, MessageType::RejectConnection, &msg);
    }
}

fn route_reply(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    let Some(desc) = node.connections.get(msg.attr1) else {
        reject(&reply, MessageType::RejectConnection, &msg);
        return;
    };
    let state = desc.lock();
    if matches!(
        *state,
        ConnectionState::ClientRequested | ConnectionState::ClientOpen
    ) {
        desc.deliver(msg, Some(reply));
    } else {
        reject(&reply, MessageType::RejectConnection, &msg);
    }
}

fn route_request_ack(node: &NodeContext, msg: NetworkMessage) {
    if let Some(desc) = node.connections.get(msg.attr1) {
        let state = desc.lock();
        if matches!(
            *state,
            ConnectionState::ClientRequested | ConnectionState::ClientOpen
        ) {
            desc.deliver(msg, None);
        }
    }
}

fn route_reply_ack(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    if let Some(desc) = node.connections.get(msg.attr1) {
        let state = desc.lock();
        if state.is_server() {
            desc.deliver(msg, Some(reply));
        }
    }
}

/// The reply path travels along so a server can tell which client gave up.
fn route_connection_reject(node: &NodeContext, msg: NetworkMessage, reply: ReplyPath) {
    if let Some(desc) = node.connections.get(msg.attr1) {
        let state = desc.lock();
        if state.is_server() || state.is_client() {
            desc.deliver(msg, Some(reply));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ChannelDescriptor, Delivery};
    use crate::node::Node;
    use crossbeam::channel::{self, Receiver};

    fn reply_sink() -> (ReplyPath, Receiver<Delivery>) {
        let (tx, rx) = channel::unbounded();
        (ReplyPath::Local(tx), rx)
    }

    fn add_channel(node: &Node, state: ChannelState, immunity: i32) -> (Arc<ChannelDescriptor>, Receiver<Delivery>) {
        let (desc, rx) = ChannelDescriptor::new(state, immunity);
        node.context().channels.create(Arc::clone(&desc));
        (desc, rx)
    }

    #[test]
    fn send_to_unknown_handle_is_rejected() {
        let node = Node::loopback("dispatch").unwrap();
        let (reply, replies) = reply_sink();
        route(
            node.context(),
            NetworkMessage::with_data(MessageType::Send, 77, 51, vec![1]),
            reply,
            None,
        );
        let got = replies.try_recv().unwrap().msg;
        assert_eq!(got.kind, MessageType::RejectChannel);
        assert_eq!(got.attr1, 51);
    }

    #[test]
    fn send_to_poisoned_input_answers_poison_level() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, inbox) = add_channel(&node, ChannelState::ActiveInput, 0);
        {
            let mut data = desc.lock();
            data.state = ChannelState::Poisoned;
            data.raise_poison(9);
        }
        let (reply, replies) = reply_sink();
        route(
            node.context(),
            NetworkMessage::with_data(MessageType::Send, desc.handle(), 60, vec![]),
            reply,
            None,
        );
        assert!(inbox.try_recv().is_err());
        let got = replies.try_recv().unwrap().msg;
        assert_eq!(got.kind, MessageType::Poison);
        assert_eq!(got.attr2, 9);
    }

    #[test]
    fn poison_respects_immunity() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, inbox) = add_channel(&node, ChannelState::ActiveInput, 3);
        let (reply, _) = reply_sink();
        route(
            node.context(),
            NetworkMessage::new(MessageType::Poison, desc.handle(), 3),
            reply.clone(),
            None,
        );
        assert!(inbox.try_recv().is_err());
        route(
            node.context(),
            NetworkMessage::new(MessageType::Poison, desc.handle(), 4),
            reply,
            None,
        );
        assert_eq!(inbox.try_recv().unwrap().msg.attr2, 4);
    }

    #[test]
    fn poison_reply_reaches_output_whatever_its_immunity() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, replies) = add_channel(&node, ChannelState::ActiveOutput, i32::MAX);
        let (reply, _) = reply_sink();
        route(
            node.context(),
            NetworkMessage::new(MessageType::Poison, desc.handle(), 7),
            reply,
            None,
        );
        let got = replies.try_recv().unwrap().msg;
        assert_eq!(got.kind, MessageType::Poison);
        assert_eq!(got.attr2, 7);
    }

    #[test]
    fn ack_ignored_unless_output_active() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, inbox) = add_channel(&node, ChannelState::Broken, i32::MAX);
        let (reply, _) = reply_sink();
        route(
            node.context(),
            NetworkMessage::new(MessageType::Ack, desc.handle(), -1),
            reply,
            None,
        );
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn resign_forwarded_only_after_enroll_on_same_link() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, inbox) = BarrierDescriptor::new(BarrierState::ActiveServer);
        let handle = node.context().barriers.create(Arc::clone(&desc));
        let (reply, _) = reply_sink();
        let mut enrolled = Vec::new();

        route(
            node.context(),
            NetworkMessage::new(MessageType::Resign, handle, 70),
            reply.clone(),
            Some(&mut enrolled),
        );
        assert!(inbox.try_recv().is_err());

        route(
            node.context(),
            NetworkMessage::new(MessageType::Enroll, handle, 70),
            reply.clone(),
            Some(&mut enrolled),
        );
        assert_eq!(enrolled.len(), 1);
        assert_eq!(inbox.try_recv().unwrap().msg.kind, MessageType::Enroll);

        route(
            node.context(),
            NetworkMessage::new(MessageType::Resign, handle, 70),
            reply,
            Some(&mut enrolled),
        );
        assert!(enrolled.is_empty());
        assert_eq!(inbox.try_recv().unwrap().msg.kind, MessageType::Resign);
    }

    #[test]
    fn sync_to_client_end_is_rejected() {
        let node = Node::loopback("dispatch").unwrap();
        let (desc, _inbox) = BarrierDescriptor::new(BarrierState::ActiveClient);
        let handle = node.context().barriers.create(desc);
        let (reply, replies) = reply_sink();
        route(
            node.context(),
            NetworkMessage::new(MessageType::Sync, handle, 81),
            reply,
            None,
        );
        let got = replies.try_recv().unwrap().msg;
        assert_eq!(got.kind, MessageType::RejectBarrier);
        assert_eq!(got.attr1, 81);
    }
}
