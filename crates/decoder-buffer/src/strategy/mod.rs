// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`BufferAllocator`] trait and its two strategies.
//!
//! The strategy is chosen once, from the platform capabilities, by
//! [`create_allocator`]:
//!
//! - [`PooledBufferAllocator`] carves buffers out of a [`ReuseAllocator`]
//!   arena whose ceiling follows the active video stream.
//! - [`DirectBufferAllocator`] forwards every request to the fallback
//!   allocator and only counts bytes.
//!
//! [`ReuseAllocator`]: reuse_allocator::ReuseAllocator

pub mod direct;
pub mod pooled;

pub use direct::DirectBufferAllocator;
pub use pooled::PooledBufferAllocator;

use crate::{Allocations, BufferError, BufferPoolStats, PlatformCapabilities, VideoConfig};
use reuse_allocator::FallbackAllocator;
use std::sync::Arc;

/// Allocator for decoder input and output buffers.
///
/// Every method takes `&self` and is safe to call from any thread.
/// Allocation never fails loudly: a denied request returns an empty
/// [`Allocations`] and the caller retries later, typically after freeing
/// buffers it holds.
pub trait BufferAllocator: Send + Sync + std::fmt::Debug {
    /// Human-readable name of this strategy.
    fn name(&self) -> &'static str;

    /// Allocates one buffer of `size` bytes aligned to `alignment`.
    ///
    /// `context` is an opaque caller tag carried into trace logs.
    fn allocate(&self, size: usize, alignment: usize, context: usize) -> Allocations;

    /// Returns every buffer of `allocations`.
    ///
    /// # Panics
    /// Panics if a buffer was not handed out by this allocator or was
    /// already returned.
    fn free(&self, allocations: Allocations);

    /// Tells the allocator about the active video stream. May raise the
    /// pool ceiling; never lowers it.
    fn update_video_config(&self, video: &VideoConfig);

    /// Releases the pool if it is idle, in response to memory pressure.
    fn suspend(&self);

    /// Re-creates a pool released by [`suspend`](Self::suspend).
    fn resume(&self);

    /// Bytes currently handed out.
    fn allocated_memory(&self) -> usize;

    /// Bytes currently reserved.
    fn current_memory_capacity(&self) -> usize;

    /// The ceiling on reserved bytes for the active stream. `0` means
    /// unbounded or not applicable.
    fn maximum_memory_capacity(&self) -> usize;

    /// Snapshot of the allocation statistics.
    fn stats(&self) -> BufferPoolStats;

    /// Allocates one buffer per plane and bundles them into one record.
    ///
    /// All or nothing: if any plane is denied, the planes already obtained
    /// are returned and the record is empty.
    fn allocate_planes(&self, plane_sizes: &[usize], alignment: usize, context: usize) -> Allocations {
        let mut record = Allocations::empty();
        for &size in plane_sizes {
            let plane = self.allocate(size, alignment, context);
            if plane.is_empty() {
                self.free(record);
                return Allocations::empty();
            }
            record.append(plane);
        }
        record
    }
}

/// Creates the allocator the platform asks for.
///
/// Returns [`BufferError::Reservation`] if the pool is created eagerly and
/// its initial reservation is refused.
pub fn create_allocator(
    platform: Arc<dyn PlatformCapabilities>,
    fallback: Arc<dyn FallbackAllocator>,
) -> Result<Box<dyn BufferAllocator>, BufferError> {
    if platform.uses_memory_pool() {
        Ok(Box::new(PooledBufferAllocator::new(platform, fallback)?))
    } else {
        Ok(Box::new(DirectBufferAllocator::new(fallback)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferPoolConfig;
    use reuse_allocator::SystemAllocator;

    fn allocator(using_memory_pool: bool) -> Box<dyn BufferAllocator> {
        let config = BufferPoolConfig {
            using_memory_pool,
            ..Default::default()
        };
        create_allocator(Arc::new(config), Arc::new(SystemAllocator)).unwrap()
    }

    #[test]
    fn test_create_pooled() {
        assert_eq!(allocator(true).name(), "pooled");
    }

    #[test]
    fn test_create_direct() {
        assert_eq!(allocator(false).name(), "direct");
    }

    #[test]
    fn test_allocate_planes_bundles_buffers() {
        for a in [allocator(true), allocator(false)] {
            let record = a.allocate_planes(&[4096, 1024, 1024], 64, 7);
            assert_eq!(record.number_of_buffers(), 3);
            assert_eq!(record.total_size(), 6144);
            assert!(record.buffers().iter().all(|b| b.as_ptr() as usize % 64 == 0));
            a.free(record);
            assert_eq!(a.allocated_memory(), 0);
        }
    }

    #[test]
    fn test_allocate_planes_all_or_nothing() {
        use crate::{BudgetRule, ByteSize, VideoCodec};

        let config = BufferPoolConfig {
            initial_capacity: ByteSize::from_kb(64),
            allocation_unit: ByteSize::from_kb(64),
            budgets: vec![BudgetRule::any_codec(640, 480, 8, ByteSize::from_kb(64))],
            ..Default::default()
        };
        let a = create_allocator(Arc::new(config), Arc::new(SystemAllocator)).unwrap();
        a.update_video_config(&VideoConfig::new(VideoCodec::H264, 640, 480, 8));

        let record = a.allocate_planes(&[32 * 1024, 16 * 1024, 32 * 1024], 16, 0);
        assert!(record.is_empty());
        assert_eq!(a.allocated_memory(), 0);
        assert_eq!(a.stats().denied_allocations, 1);
    }
}
