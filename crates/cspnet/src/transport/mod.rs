// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-stream transports underneath a [`Link`](crate::link::Link).
//!
//! A transport only knows how to reach one peer, run the identity handshake
//! and hand out a reader/writer pair. Framing, routing and failure fan-out are
//! the link's job.
//!
//! - [`tcp`]: stream sockets with the `OK`/`EXISTS` handshake
//! - [`loopback`]: in-memory pipe pair for nodes living in one process

pub mod loopback;
pub mod tcp;

use std::io::{Read, Write};

use crate::error::Result;
use crate::location::NodeId;

/// Reading half handed to a link receive loop.
pub type BoxedReader = Box<dyn Read + Send>;
/// Writing half handed to a link transmit loop.
pub type BoxedWriter = Box<dyn Write + Send>;

/// Capability interface injected into every link.
pub trait Transport: Send {
    /// Reach the peer and exchange identities.
    ///
    /// `Ok(false)` means the peer already holds a link to `local`; the remote
    /// identity is still available through [`Transport::remote_id`].
    fn connect(&mut self, local: &NodeId) -> Result<bool>;

    /// Identity of the peer, once known.
    fn remote_id(&self) -> Option<&NodeId>;

    /// Build the buffered streams. `Ok(false)` aborts the link.
    fn create_resources(&mut self, buffer_size: usize) -> Result<bool>;

    /// Take the streams built by [`Transport::create_resources`].
    fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)>;

    /// Tear the connection down, unblocking any reader or writer.
    fn destroy_resources(&mut self);

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}
