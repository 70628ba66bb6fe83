// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-writer and multi-reader wrappers.

use parking_lot::{Mutex, MutexGuard};

use super::{NetChannelInput, NetChannelOutput};
use crate::codec::Codec;
use crate::error::Result;
use crate::location::ChannelLocation;

/// Channel output usable from many threads; writes are serialised.
pub struct SharedChannelOutput<T, C> {
    inner: Mutex<NetChannelOutput<T, C>>,
    location: ChannelLocation,
}

impl<T, C: Codec<T>> SharedChannelOutput<T, C> {
    pub fn new(output: NetChannelOutput<T, C>) -> Self {
        let location = output.location().clone();
        Self {
            inner: Mutex::new(output),
            location,
        }
    }

    pub fn location(&self) -> &ChannelLocation {
        &self.location
    }

    pub fn write(&self, value: &T) -> Result<()> {
        self.inner.lock().write(value)
    }

    pub fn async_write(&self, value: &T) -> Result<()> {
        self.inner.lock().async_write(value)
    }

    pub fn poison(&self, strength: i32) {
        self.inner.lock().poison(strength);
    }

    pub fn destroy(&self) {
        self.inner.lock().destroy();
    }
}

/// Channel input usable from many threads.
///
/// Each read is exclusive; an extended read keeps the other readers out
/// until it is ended.
pub struct SharedChannelInput<T, C> {
    inner: Mutex<NetChannelInput<T, C>>,
    location: ChannelLocation,
}

impl<T, C: Codec<T>> SharedChannelInput<T, C> {
    pub fn new(input: NetChannelInput<T, C>) -> Self {
        let location = input.location().clone();
        Self {
            inner: Mutex::new(input),
            location,
        }
    }

    pub fn location(&self) -> &ChannelLocation {
        &self.location
    }

    pub fn read(&self) -> Result<T> {
        self.inner.lock().read()
    }

    /// Take the next value, holding the writer and the other readers until
    /// the returned guard is ended or dropped.
    pub fn start_read(&self) -> Result<ExtendedRead<'_, T, C>> {
        let mut guard = self.inner.lock();
        let value = guard.start_read()?;
        Ok(ExtendedRead {
            input: guard,
            value,
            ended: false,
        })
    }

    pub fn pending(&self) -> bool {
        self.inner.lock().pending()
    }

    pub fn poison(&self, strength: i32) {
        self.inner.lock().poison(strength);
    }

    pub fn destroy(&self) {
        self.inner.lock().destroy();
    }
}

/// An extended read in progress on a [`SharedChannelInput`].
pub struct ExtendedRead<'a, T, C: Codec<T>> {
    input: MutexGuard<'a, NetChannelInput<T, C>>,
    value: T,
    ended: bool,
}

impl<T, C: Codec<T>> ExtendedRead<'_, T, C> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Acknowledge the writer and release the input.
    pub fn end_read(mut self) -> Result<()> {
        self.ended = true;
        self.input.end_read()
    }
}

impl<T, C: Codec<T>> Drop for ExtendedRead<'_, T, C> {
    fn drop(&mut self) {
        if !self.ended {
            let _ = self.input.end_read();
        }
    }
}
