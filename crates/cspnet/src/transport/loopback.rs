// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback transport.
//!
//! [`pair`] builds two connected transports backed by channels of byte
//! chunks. Severing the shared wire makes every pending and future read
//! return end-of-stream and every write fail, which is how tests simulate an
//! abrupt network failure.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;

use super::{BoxedReader, BoxedWriter, Transport};
use crate::error::Result;
use crate::location::NodeId;

/// Shared failure switch for both directions of a pair.
#[derive(Clone)]
pub struct Wire {
    inner: Arc<WireInner>,
}

struct WireInner {
    // Dropping the sender disconnects every `closed` receiver at once.
    close: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
}

impl Wire {
    fn new() -> Self {
        let (close, closed) = channel::bounded(0);
        Self {
            inner: Arc::new(WireInner {
                close: Mutex::new(Some(close)),
                closed,
            }),
        }
    }

    /// Cut both directions.
    pub fn sever(&self) {
        if self.inner.close.lock().take().is_some() {
            log::debug!("loopback wire severed");
        }
    }

    pub fn is_severed(&self) -> bool {
        self.inner.close.lock().is_none()
    }
}

struct PipeReader {
    chunks: Receiver<Vec<u8>>,
    wire: Wire,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            if self.wire.is_severed() {
                return Ok(0);
            }
            select! {
                recv(self.chunks) -> chunk => match chunk {
                    Ok(chunk) => {
                        self.current = chunk;
                        self.pos = 0;
                    }
                    Err(_) => return Ok(0),
                },
                recv(self.wire.inner.closed) -> _ => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct PipeWriter {
    chunks: Sender<Vec<u8>>,
    wire: Wire,
    pending: Vec<u8>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.wire.is_severed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback severed"));
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.wire.is_severed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback severed"));
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        self.chunks
            .send(std::mem::take(&mut self.pending))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer gone"))
    }
}

/// One end of an in-memory link.
pub struct LoopbackTransport {
    remote: NodeId,
    wire: Wire,
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
    streams: Option<(BoxedReader, BoxedWriter)>,
}

impl LoopbackTransport {
    /// The failure switch shared with the other end.
    pub fn wire(&self) -> Wire {
        self.wire.clone()
    }
}

/// Two connected transports: the first is used by node `a` to reach `b`,
/// the second by `b` to reach `a`.
pub fn pair(a: NodeId, b: NodeId) -> (LoopbackTransport, LoopbackTransport) {
    let wire = Wire::new();
    let (a_to_b, b_from_a) = channel::unbounded();
    let (b_to_a, a_from_b) = channel::unbounded();

    let end = |remote: NodeId, rx: Receiver<Vec<u8>>, tx: Sender<Vec<u8>>| LoopbackTransport {
        remote,
        wire: wire.clone(),
        reader: Some(PipeReader {
            chunks: rx,
            wire: wire.clone(),
            current: Vec::new(),
            pos: 0,
        }),
        writer: Some(PipeWriter {
            chunks: tx,
            wire: wire.clone(),
            pending: Vec::new(),
        }),
        streams: None,
    };

    (end(b, a_from_b, a_to_b), end(a, b_from_a, b_to_a))
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, _local: &NodeId) -> Result<bool> {
        Ok(!self.wire.is_severed())
    }

    fn remote_id(&self) -> Option<&NodeId> {
        Some(&self.remote)
    }

    fn create_resources(&mut self, _buffer_size: usize) -> Result<bool> {
        match (self.reader.take(), self.writer.take()) {
            (Some(reader), Some(writer)) => {
                self.streams = Some((Box::new(reader), Box::new(writer)));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)> {
        self.streams.take()
    }

    fn destroy_resources(&mut self) {
        self.wire.sever();
    }

    fn describe(&self) -> String {
        format!("loopback ({})", self.remote)
    }
}
