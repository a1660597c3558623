// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation records handed out by a [`BufferAllocator`](crate::BufferAllocator).
//!
//! An [`Allocations`] record bundles one or more [`Buffer`]s obtained by a
//! single logical request (several for multi-planar pictures). The record is
//! the capability to use the memory: it is not `Clone`, and
//! [`BufferAllocator::free`](crate::BufferAllocator::free) consumes it, so a
//! record cannot be freed twice. Every buffer carries the [`OwnerId`] of the
//! allocator that produced it, and `free` refuses buffers stamped by another
//! allocator.

use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one allocator instance, stamped on every buffer it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct OwnerId(u64);

impl OwnerId {
    /// A process-unique id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One backing range of an allocation record.
pub struct Buffer {
    ptr: NonNull<u8>,
    size: usize,
    alignment: usize,
    owner: OwnerId,
}

impl Buffer {
    pub(crate) fn new(ptr: NonNull<u8>, size: usize, alignment: usize, owner: OwnerId) -> Self {
        Self {
            ptr,
            size,
            alignment,
            owner,
        }
    }

    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Start of the buffer.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment the buffer was allocated with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// The buffer as possibly-uninitialised bytes, for filling in.
    pub fn as_uninit_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        // SAFETY: the record exclusively owns `size` bytes at `ptr` until
        // it is freed, and `&mut self` prevents aliasing.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<MaybeUninit<u8>>(), self.size) }
    }

    /// Writes `data` at the start of the buffer and returns the initialised
    /// prefix.
    ///
    /// # Panics
    /// Panics if `data` is longer than the buffer.
    pub fn fill_from(&mut self, data: &[u8]) -> &mut [u8] {
        assert!(
            data.len() <= self.size,
            "{} bytes do not fit in a {}-byte buffer",
            data.len(),
            self.size
        );
        let dst = &mut self.as_uninit_mut()[..data.len()];
        for (d, s) in dst.iter_mut().zip(data) {
            d.write(*s);
        }
        // SAFETY: the first `data.len()` bytes were just initialised.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), data.len()) }
    }

    /// Views the buffer as initialised bytes.
    ///
    /// # Safety
    /// Every byte of the buffer must have been written.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: caller guarantees initialisation; ownership as above.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }
}

// A Buffer is an exclusive handle to its range, so moving it to another
// thread is fine. It is not Sync: `as_uninit_mut` needs `&mut`.
unsafe impl Send for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("owner", &self.owner)
            .finish()
    }
}

/// The result of one logical allocation: zero or more buffers.
///
/// An empty record means the allocation was denied; callers should treat it
/// as "try again later", not as a fatal error.
#[must_use = "an allocation record must be passed back to free"]
#[derive(Default)]
pub struct Allocations {
    buffers: Vec<Buffer>,
}

impl Allocations {
    /// The empty record, signalling denial.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn single(buffer: Buffer) -> Self {
        Self {
            buffers: vec![buffer],
        }
    }

    /// Returns true if the record holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of backing buffers.
    pub fn number_of_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// The backing buffers in allocation order.
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Mutable access to the backing buffers, for filling them in.
    pub fn buffers_mut(&mut self) -> &mut [Buffer] {
        &mut self.buffers
    }

    /// Sizes of the backing buffers in allocation order.
    pub fn buffer_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.buffers.iter().map(Buffer::size)
    }

    /// Sum of the requested sizes of all buffers.
    pub fn total_size(&self) -> usize {
        self.buffer_sizes().sum()
    }

    /// Moves every buffer of `other` into this record.
    pub fn append(&mut self, mut other: Allocations) {
        self.buffers.append(&mut other.buffers);
    }

    /// Empties the record, handing its buffers to the allocator that frees
    /// them.
    pub(crate) fn take_buffers(&mut self) -> Vec<Buffer> {
        std::mem::take(&mut self.buffers)
    }

    /// Empties the record for `owner` to free.
    ///
    /// # Panics
    /// Panics, leaving the record untouched, if any buffer was handed out by
    /// a different allocator.
    pub(crate) fn take_buffers_owned_by(&mut self, owner: OwnerId, allocator: &str) -> Vec<Buffer> {
        if let Some(foreign) = self.buffers.iter().find(|b| b.owner != owner) {
            panic!(
                "{allocator} allocator {owner} asked to free a buffer at {:?} owned by allocator {}",
                foreign.ptr, foreign.owner
            );
        }
        self.take_buffers()
    }
}

impl Drop for Allocations {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            tracing::warn!(
                buffers = self.buffers.len(),
                bytes = self.total_size(),
                "allocation record dropped without being freed; memory leaked"
            );
        }
    }
}

impl std::fmt::Debug for Allocations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocations")
            .field("number_of_buffers", &self.buffers.len())
            .field("total_size", &self.total_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked(size: usize) -> Buffer {
        let storage: &'static mut [u8] = Box::leak(vec![0u8; size].into_boxed_slice());
        Buffer::new(NonNull::from(storage).cast::<u8>(), size, 1, OwnerId(0))
    }

    #[test]
    fn test_empty_record() {
        let r = Allocations::empty();
        assert!(r.is_empty());
        assert_eq!(r.number_of_buffers(), 0);
        assert_eq!(r.total_size(), 0);
    }

    #[test]
    fn test_append_and_sizes() {
        let mut r = Allocations::single(leaked(100));
        r.append(Allocations::single(leaked(50)));
        assert_eq!(r.number_of_buffers(), 2);
        assert_eq!(r.buffer_sizes().collect::<Vec<_>>(), vec![100, 50]);
        assert_eq!(r.total_size(), 150);
        let _ = r.take_buffers();
        assert!(r.is_empty());
    }

    #[test]
    fn test_fill_from() {
        let mut r = Allocations::single(leaked(8));
        let written = r.buffers_mut()[0].fill_from(&[1, 2, 3]);
        assert_eq!(written, &[1, 2, 3]);
        let _ = r.take_buffers();
    }

    #[test]
    #[should_panic(expected = "do not fit")]
    fn test_fill_from_overflow_panics() {
        let mut b = leaked(2);
        b.fill_from(&[1, 2, 3]);
    }

    #[test]
    fn test_owner_ids_are_unique() {
        let a = OwnerId::next();
        let b = OwnerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_take_buffers_owned_by() {
        let mut r = Allocations::single(leaked(32));
        assert_eq!(r.take_buffers_owned_by(OwnerId(0), "test").len(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn test_foreign_buffer_is_refused_before_anything_is_taken() {
        let mut r = Allocations::single(leaked(32));
        r.append(Allocations::single(leaked(16)));
        r.buffers[1].owner = OwnerId(7);
        let taken = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            r.take_buffers_owned_by(OwnerId(0), "test")
        }));
        assert!(taken.is_err());
        assert_eq!(r.number_of_buffers(), 2);
        let _ = r.take_buffers();
    }

    #[test]
    fn test_debug_format() {
        let mut r = Allocations::single(leaked(16));
        let debug = format!("{r:?}");
        assert!(debug.contains("Allocations"));
        assert!(debug.contains("total_size"));
        let _ = r.take_buffers();
    }
}
