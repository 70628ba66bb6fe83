// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Accepts incoming TCP links for a node.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use super::handshake::{read_utf, write_utf, ANSWER_EXISTS, ANSWER_OK};
use super::{SocketOptions, TcpTransport};
use crate::error::Result;
use crate::link::Link;
use crate::location::NodeId;
use crate::node::NodeContext;

/// Idle sleep between non-blocking accept attempts.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Background accept loop for one node.
pub struct TcpLinkServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TcpLinkServer {
    /// Bind a listening socket with `SO_REUSEADDR`.
    pub(crate) fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;

        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    pub(crate) fn spawn(
        listener: TcpListener,
        node: Weak<NodeContext>,
        options: SocketOptions,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("cspnet-link-server".to_string())
            .spawn(move || accept_loop(listener, flag, node, options))?;
        log::info!("link server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Links already established keep running.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::debug!("link server on {} stopped", self.local_addr);
        }
    }
}

impl Drop for TcpLinkServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    node: Weak<NodeContext>,
    options: SocketOptions,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let Some(ctx) = node.upgrade() else {
                    break;
                };
                let _ = stream.set_nonblocking(false);
                if let Err(e) = accept_link(&ctx, stream, options) {
                    log::warn!("incoming link from {} failed: {}", addr, e);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => log::debug!("accept error: {}", e),
        }
    }
}

fn accept_link(node: &Arc<NodeContext>, mut stream: TcpStream, options: SocketOptions) -> Result<()> {
    options.apply(&stream)?;
    stream.set_read_timeout(Some(options.handshake_timeout))?;

    let remote: NodeId = read_utf(&mut stream)?.parse()?;
    let local = node.id.to_string();

    if node.links.request_link(&remote).is_some() {
        log::debug!("refusing duplicate link from {}", remote);
        write_utf(&mut stream, ANSWER_EXISTS)?;
        write_utf(&mut stream, &local)?;
        stream.flush()?;
        let _ = stream.shutdown(Shutdown::Both);
        return Ok(());
    }

    write_utf(&mut stream, ANSWER_OK)?;
    write_utf(&mut stream, &local)?;
    stream.flush()?;
    stream.set_read_timeout(None)?;

    let link = Link::new(
        node,
        Box::new(TcpTransport::accepted(stream, remote, options)),
    );
    if !node.links.register_link(&link) {
        log::warn!("accepted link lost the registration race; starting it anyway");
    }
    if let Err(e) = link.start() {
        link.destroy_resources();
        return Err(e);
    }
    Ok(())
}
