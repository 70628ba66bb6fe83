// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Alternation over endpoint inputs.
//!
//! An [`Alternative`] blocks until one of several guards is ready and
//! returns its index; the caller then performs the blocking operation on
//! that endpoint, which will not wait on an empty queue. Selection never
//! consumes a message.
//!
//! | Guard | Ready when |
//! |-------|------------|
//! | [`NetChannelInput`](crate::NetChannelInput) | a message is queued, or the input is poisoned, destroyed or broken |
//! | [`NetConnectionClient`](crate::NetConnectionClient) | the reply (or a failure) to an outstanding request has arrived |
//! | [`NetConnectionServer`](crate::NetConnectionServer) | a client OPEN or session message is queued |
//!
//! ```rust,no_run
//! use cspnet::{Alternative, Node, Utf8Codec};
//!
//! # fn main() -> cspnet::Result<()> {
//! let node = Node::loopback("alt_demo")?;
//! let mut left = node.net2one::<String, _>(Utf8Codec)?;
//! let mut right = node.net2one::<String, _>(Utf8Codec)?;
//! let mut alt = Alternative::new();
//! let value = match alt.fair_select(&[&left, &right])? {
//!     0 => left.read()?,
//!     _ => right.read()?,
//! };
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Select};

use crate::descriptor::Delivery;
use crate::error::{Error, Result};

/// An endpoint an [`Alternative`] can wait on.
pub trait Guard {
    /// Snapshot of this endpoint's readiness and the queue to watch.
    fn alt_guard(&self) -> AltGuard<'_>;
}

/// Readiness snapshot handed out by a [`Guard`].
pub struct AltGuard<'a> {
    queue: &'a Receiver<Delivery>,
    ready: bool,
}

impl<'a> AltGuard<'a> {
    pub(crate) fn new(queue: &'a Receiver<Delivery>, ready: bool) -> Self {
        Self { queue, ready }
    }

    /// True if the guarded operation would not wait on an empty queue.
    pub fn is_ready(&self) -> bool {
        self.ready || !self.queue.is_empty()
    }
}

/// Chooses among ready guards.
#[derive(Debug, Default)]
pub struct Alternative {
    /// Index served first by the next fair selection
    favourite: usize,
}

impl Alternative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a guard is ready; lower indices win ties.
    pub fn pri_select(&mut self, guards: &[&dyn Guard]) -> Result<usize> {
        self.wait(guards, 0, None)?
            .ok_or(Error::ProtocolMisuse("untimed selection returned no guard"))
    }

    /// Block until a guard is ready; ties rotate so no guard starves.
    pub fn fair_select(&mut self, guards: &[&dyn Guard]) -> Result<usize> {
        let start = self.favourite;
        let chosen = self
            .wait(guards, start, None)?
            .ok_or(Error::ProtocolMisuse("untimed selection returned no guard"))?;
        self.favourite = (chosen + 1) % guards.len();
        Ok(chosen)
    }

    /// Like [`pri_select`](Self::pri_select), giving up after `timeout`.
    ///
    /// `Ok(None)` means no guard became ready in time.
    pub fn select_timeout(
        &mut self,
        guards: &[&dyn Guard],
        timeout: Duration,
    ) -> Result<Option<usize>> {
        self.wait(guards, 0, Some(Instant::now() + timeout))
    }

    /// Non-blocking selection.
    pub fn poll(&mut self, guards: &[&dyn Guard]) -> Result<Option<usize>> {
        if guards.is_empty() {
            return Err(Error::InvalidArgument("no guards to select from".into()));
        }
        Ok(first_ready(guards, 0))
    }

    fn wait(
        &mut self,
        guards: &[&dyn Guard],
        start: usize,
        deadline: Option<Instant>,
    ) -> Result<Option<usize>> {
        if guards.is_empty() {
            return Err(Error::InvalidArgument("no guards to select from".into()));
        }
        loop {
            if let Some(chosen) = first_ready(guards, start) {
                return Ok(Some(chosen));
            }
            let snapshots: Vec<AltGuard<'_>> = guards.iter().map(|g| g.alt_guard()).collect();
            let mut select = Select::new();
            for snapshot in &snapshots {
                select.recv(snapshot.queue);
            }
            // Only a wake-up; the scan above picks the winner by order.
            let woke = match deadline {
                None => select.ready(),
                Some(deadline) => match select.ready_deadline(deadline) {
                    Ok(index) => index,
                    Err(_) => return Ok(first_ready(guards, start)),
                },
            };
            log::trace!("alternative woken by guard {}", woke);
        }
    }
}

/// First ready guard, scanning from `start` and wrapping around.
fn first_ready(guards: &[&dyn Guard], start: usize) -> Option<usize> {
    let n = guards.len();
    (0..n)
        .map(|k| (start + k) % n)
        .find(|&i| guards[i].alt_guard().is_ready())
}
