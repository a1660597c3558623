// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Direct strategy: every buffer comes straight from the fallback allocator.
//!
//! There is no arena, so nothing is reserved beyond what is handed out:
//! capacity always equals the allocated byte count. Only atomic counters
//! are shared between threads.

use crate::record::{Buffer, OwnerId};
use crate::{Allocations, BufferAllocator, BufferPoolStats, VideoConfig};
use reuse_allocator::FallbackAllocator;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Buffer allocator that bypasses pooling.
pub struct DirectBufferAllocator {
    id: OwnerId,
    fallback: Arc<dyn FallbackAllocator>,
    allocated_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    total_allocations: AtomicU64,
    denied_allocations: AtomicU64,
    total_frees: AtomicU64,
}

impl DirectBufferAllocator {
    pub fn new(fallback: Arc<dyn FallbackAllocator>) -> Self {
        tracing::info!("direct buffer allocator ready");
        Self {
            id: OwnerId::next(),
            fallback,
            allocated_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            total_allocations: AtomicU64::new(0),
            denied_allocations: AtomicU64::new(0),
            total_frees: AtomicU64::new(0),
        }
    }
}

impl BufferAllocator for DirectBufferAllocator {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn allocate(&self, size: usize, alignment: usize, context: usize) -> Allocations {
        let alignment = alignment.max(1);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);

        let ptr = if alignment.is_power_of_two() {
            self.fallback.allocate(size, alignment)
        } else {
            tracing::warn!(alignment, "denying allocation with non-power-of-two alignment");
            None
        };
        let Some(ptr) = ptr else {
            tracing::debug!(size, alignment, "direct allocation denied");
            self.denied_allocations.fetch_add(1, Ordering::Relaxed);
            return Allocations::empty();
        };

        let now = self.allocated_bytes.fetch_add(size, Ordering::AcqRel) + size;
        self.peak_bytes.fetch_max(now, Ordering::Relaxed);
        tracing::trace!(ptr = ?ptr, size, alignment, context, "allocate");

        Allocations::single(Buffer::new(ptr, size, alignment, self.id))
    }

    fn free(&self, mut allocations: Allocations) {
        for buffer in allocations.take_buffers_owned_by(self.id, self.name()) {
            tracing::trace!(ptr = ?buffer.ptr(), size = buffer.size(), "free");
            let size = buffer.size();
            if self
                .allocated_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bytes| bytes.checked_sub(size))
                .is_err()
            {
                panic!("direct byte counter underflow freeing {size} bytes");
            }
            // SAFETY: the buffer carries this allocator's id, so it was
            // obtained from `self.fallback` with this size and alignment, and
            // the consumed record cannot return it again.
            unsafe {
                self.fallback.deallocate(buffer.ptr(), size, buffer.alignment());
            }
            self.total_frees.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn update_video_config(&self, _video: &VideoConfig) {}

    fn suspend(&self) {}

    fn resume(&self) {}

    fn allocated_memory(&self) -> usize {
        self.allocated_bytes.load(Ordering::Acquire)
    }

    fn current_memory_capacity(&self) -> usize {
        self.allocated_memory()
    }

    fn maximum_memory_capacity(&self) -> usize {
        0
    }

    fn stats(&self) -> BufferPoolStats {
        let peak = self.peak_bytes.load(Ordering::Relaxed);
        BufferPoolStats {
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            denied_allocations: self.denied_allocations.load(Ordering::Relaxed),
            total_frees: self.total_frees.load(Ordering::Relaxed),
            peak_allocated_bytes: peak,
            peak_capacity_bytes: peak,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for DirectBufferAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectBufferAllocator")
            .field("id", &self.id)
            .field("allocated_bytes", &self.allocated_memory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoCodec;
    use reuse_allocator::{BoundedAllocator, SystemAllocator};

    fn direct() -> DirectBufferAllocator {
        DirectBufferAllocator::new(Arc::new(SystemAllocator))
    }

    #[test]
    fn test_allocate_free() {
        let a = direct();
        let r = a.allocate(4096, 64, 0);
        assert_eq!(r.number_of_buffers(), 1);
        assert_eq!(r.buffers()[0].as_ptr() as usize % 64, 0);
        assert_eq!(a.allocated_memory(), 4096);
        assert_eq!(a.current_memory_capacity(), 4096);

        a.free(r);
        assert_eq!(a.allocated_memory(), 0);
        assert_eq!(a.current_memory_capacity(), 0);
    }

    #[test]
    fn test_policy_calls_are_noops() {
        let a = direct();
        let r = a.allocate(100, 16, 0);
        a.update_video_config(&VideoConfig::new(VideoCodec::Vp9, 3840, 2160, 10));
        a.suspend();
        a.resume();
        assert_eq!(a.maximum_memory_capacity(), 0);
        assert_eq!(a.allocated_memory(), 100);
        a.free(r);
    }

    #[test]
    fn test_fallback_refusal_is_denial() {
        let fallback = Arc::new(BoundedAllocator::new(1000));
        let a = DirectBufferAllocator::new(fallback.clone());
        let r1 = a.allocate(800, 16, 0);
        assert!(!r1.is_empty());
        let r2 = a.allocate(800, 16, 0);
        assert!(r2.is_empty());
        assert_eq!(a.stats().denied_allocations, 1);

        a.free(r1);
        assert_eq!(fallback.in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "owned by allocator")]
    fn test_free_of_another_direct_allocators_record_panics() {
        let fallback = Arc::new(BoundedAllocator::new(64 * 1024));
        let a = DirectBufferAllocator::new(fallback.clone());
        let b = DirectBufferAllocator::new(fallback);
        let r = a.allocate(4096, 64, 0);
        assert!(!r.is_empty());
        b.free(r);
    }

    #[test]
    fn test_foreign_free_leaves_both_allocators_untouched() {
        let fallback = Arc::new(BoundedAllocator::new(64 * 1024));
        let a = DirectBufferAllocator::new(fallback.clone());
        let b = DirectBufferAllocator::new(fallback.clone());
        let r = a.allocate(4096, 64, 0);
        let freed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| b.free(r)));
        assert!(freed.is_err());
        assert_eq!(a.allocated_memory(), 4096);
        assert_eq!(b.allocated_memory(), 0);
        assert_eq!(fallback.in_use(), 4096);
    }

    #[test]
    #[should_panic(expected = "owned by allocator")]
    fn test_free_of_pooled_record_panics() {
        let pooled = crate::BufferPoolConfig::default().create_allocator().unwrap();
        let r = pooled.allocate(4096, 64, 0);
        assert!(!r.is_empty());
        direct().free(r);
    }

    #[test]
    fn test_stats_peak() {
        let a = direct();
        let r1 = a.allocate(1000, 16, 0);
        let r2 = a.allocate(2000, 16, 0);
        a.free(r1);
        a.free(r2);
        let stats = a.stats();
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.total_frees, 2);
        assert_eq!(stats.peak_allocated_bytes, 3000);
    }
}
