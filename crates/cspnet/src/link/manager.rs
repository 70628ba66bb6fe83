// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link lifecycle manager.
//!
//! Keeps at most one registered link per remote [`NodeId`] and tells
//! subscribers when a registered link goes away.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::Link;
use crate::location::NodeId;

/// Table of live links, keyed by remote node.
#[derive(Default)]
pub struct LinkManager {
    links: DashMap<NodeId, Arc<Link>>,
    listeners: Mutex<Vec<Sender<NodeId>>>,
}

impl LinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected link. Returns `false` if a link to the same node
    /// is already registered (or the link has no remote identity yet).
    pub fn register_link(&self, link: &Arc<Link>) -> bool {
        let Some(remote) = link.remote_id() else {
            return false;
        };
        match self.links.entry(remote) {
            Entry::Occupied(existing) => {
                log::debug!("link to {} already registered", existing.key());
                false
            }
            Entry::Vacant(slot) => {
                log::debug!("registered link to {}", slot.key());
                slot.insert(Arc::clone(link));
                true
            }
        }
    }

    /// The registered link to `remote`, if any.
    pub fn request_link(&self, remote: &NodeId) -> Option<Arc<Link>> {
        self.links.get(remote).map(|l| Arc::clone(l.value()))
    }

    /// Drop `link` from the table and notify subscribers.
    ///
    /// Only the exact link passed in is removed; a healthy link registered for
    /// the same node by a concurrent handshake is left alone.
    pub fn lost_link(&self, link: &Link) {
        let Some(remote) = link.remote_id() else {
            return;
        };
        let removed = self
            .links
            .remove_if(&remote, |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), link)
            })
            .is_some();
        if removed {
            self.listeners
                .lock()
                .retain(|listener| listener.send(remote.clone()).is_ok());
        }
    }

    /// Subscribe to link-loss notifications.
    pub fn link_lost_events(&self) -> Receiver<NodeId> {
        let (tx, rx) = channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    /// Registered link whose remote node has the given address.
    pub fn link_for_address(&self, address: &crate::location::NodeAddress) -> Option<Arc<Link>> {
        self.links
            .iter()
            .find(|entry| entry.key().address() == address)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every registered link.
    pub fn links(&self) -> Vec<Arc<Link>> {
        self.links.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
