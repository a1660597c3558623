// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The raw memory source behind the arena.
//!
//! [`FallbackAllocator`] is the seam to the platform: the arena grows by
//! asking it for aligned regions, and direct (unpooled) buffers come from it
//! too. Failure is reported as `None`, never as a panic.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A thread-safe source of raw aligned memory.
///
/// Implementations must be callable concurrently from any thread, since the
/// pooled path and the direct path may both hit it at the same time.
pub trait FallbackAllocator: Send + Sync {
    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// `alignment` is always a power of two. Returns `None` when the memory
    /// cannot be provided.
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>>;

    /// Returns a region previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// `ptr`, `size` and `alignment` must match exactly one earlier successful
    /// call to `allocate` on this allocator, and the region must not be used
    /// afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize);
}

/// [`FallbackAllocator`] backed by the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SystemAllocator {
    fn layout(size: usize, alignment: usize) -> Option<Layout> {
        // Zero-sized layouts are not allowed by `alloc`.
        Layout::from_size_align(size.max(1), alignment).ok()
    }
}

impl FallbackAllocator for SystemAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let layout = Self::layout(size, alignment)?;
        // SAFETY: `layout` has a non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        match Self::layout(size, alignment) {
            // SAFETY: the caller guarantees `ptr` came from `allocate` with
            // the same size and alignment, so the layout matches.
            Some(layout) => unsafe { alloc::dealloc(ptr.as_ptr(), layout) },
            None => unreachable!("deallocate called with a layout allocate never accepted"),
        }
    }
}

/// A [`FallbackAllocator`] that refuses to hand out more than `limit` bytes
/// at once, modelling a device with a hard memory cap.
#[derive(Debug)]
pub struct BoundedAllocator<A = SystemAllocator> {
    inner: A,
    limit: usize,
    in_use: AtomicUsize,
}

impl BoundedAllocator<SystemAllocator> {
    /// Caps the system allocator at `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self::wrap(SystemAllocator, limit)
    }
}

impl<A: FallbackAllocator> BoundedAllocator<A> {
    /// Caps `inner` at `limit` bytes.
    pub fn wrap(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Bytes currently handed out through this allocator.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// The configured cap in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<A: FallbackAllocator> FallbackAllocator for BoundedAllocator<A> {
    fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let limit = self.limit;
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(size).filter(|&next| next <= limit)
            })
            .ok()?;

        let ptr = self.inner.allocate(size, alignment);
        if ptr.is_none() {
            self.in_use.fetch_sub(size, Ordering::AcqRel);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        // SAFETY: forwarded contract.
        unsafe { self.inner.deallocate(ptr, size, alignment) };
        self.in_use.fetch_sub(size, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_allocator_alignment() {
        let sys = SystemAllocator;
        for &align in &[16usize, 64, 4096] {
            let p = sys.allocate(100, align).unwrap();
            assert_eq!(p.as_ptr() as usize % align, 0);
            unsafe { sys.deallocate(p, 100, align) };
        }
    }

    #[test]
    fn test_system_allocator_zero_size() {
        let sys = SystemAllocator;
        let p = sys.allocate(0, 16).unwrap();
        unsafe { sys.deallocate(p, 0, 16) };
    }

    #[test]
    fn test_system_allocator_rejects_bad_alignment() {
        assert!(SystemAllocator.allocate(64, 24).is_none());
    }

    #[test]
    fn test_bounded_allocator_enforces_limit() {
        let bounded = BoundedAllocator::new(1024);

        let a = bounded.allocate(512, 16).unwrap();
        let b = bounded.allocate(512, 16).unwrap();
        assert_eq!(bounded.in_use(), 1024);
        assert!(bounded.allocate(1, 16).is_none());

        unsafe { bounded.deallocate(a, 512, 16) };
        assert_eq!(bounded.in_use(), 512);
        let c = bounded.allocate(256, 16).unwrap();

        unsafe {
            bounded.deallocate(b, 512, 16);
            bounded.deallocate(c, 256, 16);
        }
        assert_eq!(bounded.in_use(), 0);
    }

    #[test]
    fn test_bounded_allocator_rolls_back_inner_failure() {
        // Bad alignment makes the inner allocator refuse.
        let bounded = BoundedAllocator::new(1024);
        assert!(bounded.allocate(64, 24).is_none());
        assert_eq!(bounded.in_use(), 0);
    }
}
