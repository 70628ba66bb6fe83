// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle-allocating descriptor tables.
//!
//! A node owns three registries (channels, barriers, connections). Each maps a
//! small integer handle to a shared descriptor. Handles below
//! [`FIRST_DYNAMIC_HANDLE`] are never auto-allocated; they are kept for
//! well-known endpoints created with an explicit handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Endpoint handle (VCN / VBN / connection number).
pub type Handle = i32;

/// First handle handed out by automatic allocation.
pub const FIRST_DYNAMIC_HANDLE: Handle = 50;

/// Descriptor that learns its handle when it is registered.
pub(crate) trait Indexed {
    fn bind_handle(&self, handle: Handle);
}

/// Thread-safe handle -> descriptor table.
///
/// The table lock is held only for the allocation or lookup itself, never
/// while a descriptor lock is taken or a caller blocks.
pub(crate) struct Registry<D> {
    kind: &'static str,
    inner: Mutex<Table<D>>,
}

struct Table<D> {
    next: Handle,
    entries: HashMap<Handle, Arc<D>>,
}

impl<D: Indexed> Registry<D> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: Mutex::new(Table {
                next: FIRST_DYNAMIC_HANDLE,
                entries: HashMap::new(),
            }),
        }
    }

    /// Register under the next free handle, probing upward past collisions.
    pub(crate) fn create(&self, descriptor: Arc<D>) -> Handle {
        let mut table = self.inner.lock();
        let mut handle = table.next;
        while table.entries.contains_key(&handle) {
            handle += 1;
        }
        descriptor.bind_handle(handle);
        table.entries.insert(handle, descriptor);
        table.next = handle + 1;
        log::trace!("{} registry: allocated {}", self.kind, handle);
        handle
    }

    /// Register under an explicit handle.
    ///
    /// Fails with [`Error::AlreadyExists`] and leaves the table untouched when
    /// the handle is taken.
    pub(crate) fn create_at(&self, handle: Handle, descriptor: Arc<D>) -> Result<()> {
        if handle < 0 {
            return Err(Error::InvalidArgument(format!(
                "negative {} handle {}",
                self.kind, handle
            )));
        }
        let mut table = self.inner.lock();
        if table.entries.contains_key(&handle) {
            return Err(Error::AlreadyExists(handle));
        }
        descriptor.bind_handle(handle);
        table.entries.insert(handle, descriptor);
        if handle == table.next {
            table.next += 1;
        }
        log::trace!("{} registry: registered explicit {}", self.kind, handle);
        Ok(())
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<Arc<D>> {
        self.inner.lock().entries.get(&handle).cloned()
    }

    /// Remove `descriptor` if it is still the one registered at `handle`.
    pub(crate) fn remove(&self, handle: Handle, descriptor: &Arc<D>) {
        let mut table = self.inner.lock();
        if table
            .entries
            .get(&handle)
            .is_some_and(|current| Arc::ptr_eq(current, descriptor))
        {
            table.entries.remove(&handle);
            log::trace!("{} registry: removed {}", self.kind, handle);
        }
    }

    /// Number of live descriptors.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
