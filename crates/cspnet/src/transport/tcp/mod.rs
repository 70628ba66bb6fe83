// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP/IP transport.
//!
//! [`TcpTransport`] is the client side of a link (and, once accepted, the
//! server side too); [`TcpLinkServer`] accepts incoming links for a node.

mod handshake;
mod server;

pub use server::TcpLinkServer;

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use super::{BoxedReader, BoxedWriter, Transport};
use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::location::NodeId;
use handshake::{read_utf, write_utf, ANSWER_EXISTS, ANSWER_OK};

/// Socket options applied to every link socket.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SocketOptions {
    pub nodelay: bool,
    pub keepalive: bool,
    pub handshake_timeout: Duration,
}

impl SocketOptions {
    pub(crate) fn from_config(config: &NodeConfig) -> Self {
        Self {
            nodelay: config.tcp_nodelay,
            keepalive: config.tcp_keepalive,
            handshake_timeout: config.handshake_timeout(),
        }
    }

    pub(crate) fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        socket2::SockRef::from(stream).set_keepalive(self.keepalive)?;
        Ok(())
    }
}

/// TCP stream between two nodes.
pub struct TcpTransport {
    peer: SocketAddr,
    options: SocketOptions,
    stream: Option<TcpStream>,
    remote: Option<NodeId>,
    streams: Option<(BoxedReader, BoxedWriter)>,
}

impl TcpTransport {
    /// Transport that will dial `peer` on [`Transport::connect`].
    pub fn new(peer: SocketAddr, config: &NodeConfig) -> Self {
        Self {
            peer,
            options: SocketOptions::from_config(config),
            stream: None,
            remote: None,
            streams: None,
        }
    }

    /// Transport around a socket whose handshake the link server completed.
    pub(crate) fn accepted(stream: TcpStream, remote: NodeId, options: SocketOptions) -> Self {
        let peer = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        Self {
            peer,
            options,
            stream: Some(stream),
            remote: Some(remote),
            streams: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, local: &NodeId) -> Result<bool> {
        if self.stream.is_some() && self.remote.is_some() {
            return Ok(true);
        }

        let mut stream = TcpStream::connect_timeout(&self.peer, self.options.handshake_timeout)
            .map_err(|e| Error::Connect(format!("{}: {}", self.peer, e)))?;
        self.options.apply(&stream)?;
        stream.set_read_timeout(Some(self.options.handshake_timeout))?;

        write_utf(&mut stream, &local.to_string())?;
        stream.flush()?;
        let answer = read_utf(&mut stream)?;
        let remote: NodeId = read_utf(&mut stream)?.parse()?;
        log::debug!("handshake with {}: {} ({})", self.peer, answer, remote);
        self.remote = Some(remote);

        match answer.as_str() {
            ANSWER_OK => {
                stream.set_read_timeout(None)?;
                self.stream = Some(stream);
                Ok(true)
            }
            ANSWER_EXISTS => Ok(false),
            other => Err(Error::Connect(format!(
                "unexpected handshake answer {:?} from {}",
                other, self.peer
            ))),
        }
    }

    fn remote_id(&self) -> Option<&NodeId> {
        self.remote.as_ref()
    }

    fn create_resources(&mut self, buffer_size: usize) -> Result<bool> {
        let Some(stream) = &self.stream else {
            return Ok(false);
        };
        let reader = BufReader::with_capacity(buffer_size, stream.try_clone()?);
        let writer = BufWriter::with_capacity(buffer_size, stream.try_clone()?);
        self.streams = Some((Box::new(reader), Box::new(writer)));
        Ok(true)
    }

    fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)> {
        self.streams.take()
    }

    fn destroy_resources(&mut self) {
        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn describe(&self) -> String {
        match &self.remote {
            Some(remote) => format!("tcp {} ({})", self.peer, remote),
            None => format!("tcp {}", self.peer),
        }
    }
}
