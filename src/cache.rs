//! Reference-tracking collaborator for decoded root objects.
//!
//! The decoder does not traverse object graphs itself; it owns an
//! [`ObjectCache`] and exposes it to the type model, which registers roots
//! and resolves back-references by key. A key can be reserved before the
//! object finishes decoding (a "trap"), then fulfilled once it exists, which
//! is how cyclic references are stitched up.

// This module uses `as` casts which have been reviewed for correctness.
#![allow(clippy::as_conversions)]

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use crate::error::DecodeErrorKind;

/// Cache of decoded root objects, keyed by registration order.
#[derive(Default)]
pub struct ObjectCache {
    slots: Vec<Option<Rc<dyn Any>>>,
    pending: usize,
}

impl ObjectCache {
    pub(crate) fn new() -> Self {
        ObjectCache::default()
    }

    /// Register a fully decoded object, returning its key.
    pub fn register(&mut self, object: Rc<dyn Any>) -> u32 {
        let key = self.slots.len() as u32;
        self.slots.push(Some(object));
        key
    }

    /// Reserve a key for an object whose decoding is still in progress.
    pub fn reserve(&mut self) -> u32 {
        let key = self.slots.len() as u32;
        self.slots.push(None);
        self.pending += 1;
        key
    }

    /// Fulfil a previously [`reserve`](ObjectCache::reserve)d key.
    pub fn fulfil(&mut self, key: u32, object: Rc<dyn Any>) -> Result<(), DecodeErrorKind> {
        match self.slots.get_mut(key as usize) {
            Some(slot @ None) => {
                *slot = Some(object);
                self.pending -= 1;
                Ok(())
            }
            Some(Some(_)) => Err(DecodeErrorKind::programming_error(
                "object key fulfilled twice",
            )),
            None => Err(DecodeErrorKind::programming_error(
                "object key was never reserved",
            )),
        }
    }

    /// Look up a previously registered object by key.
    ///
    /// Returns `None` for unknown keys and for reserved-but-unfulfilled
    /// ones.
    pub fn lookup(&self, key: u32) -> Option<Rc<dyn Any>> {
        self.slots.get(key as usize)?.clone()
    }

    /// Number of reserved keys not yet fulfilled.
    pub fn trap_count(&self) -> usize {
        self.pending
    }

    /// Drop all registrations and reservations.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.pending = 0;
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("registered", &self.slots.len())
            .field("pending", &self.pending)
            .finish()
    }
}
