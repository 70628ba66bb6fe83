// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound path from an endpoint to its counterpart.

use std::sync::Arc;

use crossbeam::channel::Sender;

use super::{dispatch, factory, Link};
use crate::descriptor::{Delivery, ReplyPath};
use crate::error::Result;
use crate::location::NodeId;
use crate::node::NodeContext;
use crate::protocol::NetworkMessage;

/// Where an endpoint's outgoing messages go.
pub(crate) enum Peer {
    /// Over a link to another node
    Remote(Arc<Link>),
    /// Counterpart lives on this node; messages skip the link entirely
    Local,
}

impl Peer {
    pub(crate) fn resolve(node: &Arc<NodeContext>, remote: &NodeId) -> Result<Self> {
        if *remote == node.id {
            Ok(Peer::Local)
        } else {
            factory::get_link(node, remote).map(Peer::Remote)
        }
    }

    /// Send `msg`; replies to a local send land in `reply_to`.
    pub(crate) fn send(&self, node: &NodeContext, msg: NetworkMessage, reply_to: &Sender<Delivery>) {
        match self {
            Peer::Remote(link) => link.send(msg),
            Peer::Local => dispatch::route(node, msg, ReplyPath::Local(reply_to.clone()), None),
        }
    }

    pub(crate) fn link(&self) -> Option<&Arc<Link>> {
        match self {
            Peer::Remote(link) => Some(link),
            Peer::Local => None,
        }
    }
}
