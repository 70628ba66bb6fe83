// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resolves a remote node to a running link, creating one if needed.

use std::sync::Arc;
use std::time::Instant;

use super::Link;
use crate::error::{Error, Result};
use crate::location::{NodeAddress, NodeId};
use crate::node::NodeContext;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;

/// Link to `remote`, reusing a registered one when present.
pub(crate) fn get_link(node: &Arc<NodeContext>, remote: &NodeId) -> Result<Arc<Link>> {
    if *remote == node.id {
        return Err(Error::InvalidArgument(
            "attempted to create a link to the local node".into(),
        ));
    }
    if let Some(link) = node.links.request_link(remote) {
        return Ok(link);
    }
    create_link(node, remote.address())
}

/// Link to whatever node answers at `address`.
pub(crate) fn get_link_by_address(node: &Arc<NodeContext>, address: &NodeAddress) -> Result<Arc<Link>> {
    if address == node.id.address() {
        return Err(Error::InvalidArgument(
            "attempted to create a link to the local node".into(),
        ));
    }
    if let Some(link) = node.links.link_for_address(address) {
        return Ok(link);
    }
    create_link(node, address)
}

fn create_link(node: &Arc<NodeContext>, address: &NodeAddress) -> Result<Arc<Link>> {
    let transport: Box<dyn Transport> = match address {
        NodeAddress::Tcp(addr) => Box::new(TcpTransport::new(*addr, &node.config)),
        NodeAddress::Loopback(name) => {
            return Err(Error::Connect(format!(
                "no link to loopback node {:?}; loopback nodes must be attached",
                name
            )))
        }
    };

    let link = Link::new(node, transport);
    if !link.connect()? {
        let remote = link
            .remote_id()
            .ok_or_else(|| Error::Connect(format!("{} did not identify itself", address)))?;
        return wait_for_link(node, &remote);
    }

    if !node.links.register_link(&link) {
        // Both sides connected at once; the peer's link won the table slot.
        // This one still works, so it is started and handed out.
        log::warn!("link to {} lost the registration race", address);
    }
    if let Err(e) = link.start() {
        link.destroy_resources();
        return Err(e);
    }
    Ok(link)
}

/// Poll until the link opened by the peer towards this node is registered.
fn wait_for_link(node: &Arc<NodeContext>, remote: &NodeId) -> Result<Arc<Link>> {
    let deadline = Instant::now() + node.config.link_wait_timeout();
    loop {
        if let Some(link) = node.links.request_link(remote) {
            return Ok(link);
        }
        if Instant::now() >= deadline {
            return Err(Error::Connect(format!(
                "timed out waiting for link from {}",
                remote
            )));
        }
        std::thread::sleep(node.config.link_poll_interval());
    }
}
