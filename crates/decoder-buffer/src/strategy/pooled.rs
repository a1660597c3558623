// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pooled strategy: buffers are carved out of a reuse-allocator arena.
//!
//! # Pool Lifecycle
//! ```text
//!   eager:      new ──► [pool] ──suspend (idle)──► [none] ──resume──► [pool]
//!   on demand:  new ──► [none] ──allocate──► [pool] ──last free──► [none]
//! ```
//! A missing pool is also created lazily by the next `allocate` in either
//! mode. A suspend that finds the pool busy is remembered, and the pool is
//! released as soon as it drains.
//!
//! # Ceiling
//! The pool's `max_capacity` comes from the platform budget for the active
//! video stream. It is computed when the pool is created and raised (never
//! lowered) on every [`update_video_config`](BufferAllocator::update_video_config).

use crate::record::{Buffer, OwnerId};
use crate::{Allocations, BufferAllocator, BufferError, BufferPoolStats, PlatformCapabilities, VideoConfig};
use reuse_allocator::{FallbackAllocator, ReuseAllocator, ReuseConfig, ReuseError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything the lock protects.
#[derive(Debug)]
struct PoolState {
    pool: Option<ReuseAllocator>,
    video: VideoConfig,
    /// A suspend found the pool busy; release it once it drains.
    suspend_pending: bool,
    stats: BufferPoolStats,
}

/// Buffer allocator backed by a growable, budgeted arena.
pub struct PooledBufferAllocator {
    id: OwnerId,
    platform: Arc<dyn PlatformCapabilities>,
    fallback: Arc<dyn FallbackAllocator>,
    on_demand: bool,
    pool_config: ReuseConfig,
    state: Mutex<PoolState>,
}

impl PooledBufferAllocator {
    /// Creates the allocator. In eager mode the pool is created here, with
    /// no ceiling since no video stream is known yet.
    pub fn new(
        platform: Arc<dyn PlatformCapabilities>,
        fallback: Arc<dyn FallbackAllocator>,
    ) -> Result<Self, BufferError> {
        let on_demand = platform.allocates_pool_on_demand();
        let pool_config = ReuseConfig {
            initial_capacity: platform.initial_capacity(),
            small_allocation_threshold: platform.small_allocation_threshold(),
            allocation_unit: platform.allocation_unit(),
            max_capacity: 0,
        };

        let allocator = Self {
            id: OwnerId::next(),
            platform,
            fallback,
            on_demand,
            pool_config,
            state: Mutex::new(PoolState {
                pool: None,
                video: VideoConfig::default(),
                suspend_pending: false,
                stats: BufferPoolStats::new(pool_config.initial_capacity),
            }),
        };

        if !on_demand {
            let mut state = allocator.lock();
            let pool = allocator.create_pool(&mut state)?;
            state.pool = Some(pool);
        }

        tracing::info!(
            on_demand,
            initial_capacity = pool_config.initial_capacity,
            allocation_unit = pool_config.allocation_unit,
            "pooled buffer allocator ready"
        );
        Ok(allocator)
    }

    /// Returns true if a pool currently exists.
    pub fn has_pool(&self) -> bool {
        self.lock().pool.is_some()
    }

    /// Logs live and free block histograms of the current pool.
    pub fn log_allocations(&self) {
        match &self.lock().pool {
            Some(pool) => pool.log_allocations(),
            None => tracing::info!("no buffer pool"),
        }
    }

    /// Verifies the pool's free list and accounting.
    pub fn check_integrity(&self) -> Result<(), ReuseError> {
        match &self.lock().pool {
            Some(pool) => pool.check_integrity(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic under the lock is a contract violation that has already
        // been reported; the state itself is consistent between operations.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Budget for `video`, or `0` while the codec is unknown.
    fn budget_for(&self, video: &VideoConfig) -> usize {
        if video.is_known() {
            self.platform.max_buffer_capacity(video)
        } else {
            0
        }
    }

    /// Reserves a pool for the current stream. The caller installs it.
    fn create_pool(&self, state: &mut PoolState) -> Result<ReuseAllocator, ReuseError> {
        let config = ReuseConfig {
            max_capacity: self.budget_for(&state.video),
            ..self.pool_config
        };
        let pool = ReuseAllocator::new(self.fallback.clone(), config)?;
        tracing::info!(
            capacity = pool.capacity(),
            max_capacity = pool.max_capacity(),
            video = %state.video,
            "created decoder buffer pool"
        );
        state.stats.record_pool_created(pool.capacity());
        Ok(pool)
    }

    fn release_pool(&self, state: &mut PoolState, reason: &'static str) {
        if let Some(pool) = state.pool.take() {
            debug_assert_eq!(pool.allocated(), 0, "released a busy pool");
            tracing::info!(capacity = pool.capacity(), reason, "released decoder buffer pool");
            state.stats.record_pool_released();
            state.suspend_pending = false;
        }
    }

    /// Releases the pool if nothing is live in it and policy says an idle
    /// pool should not be kept.
    fn release_if_drained(&self, state: &mut PoolState) {
        let idle = state.pool.as_ref().is_some_and(|p| p.allocated() == 0);
        if !idle {
            return;
        }
        if self.on_demand {
            self.release_pool(state, "drained on demand");
        } else if state.suspend_pending {
            self.release_pool(state, "drained after suspend");
        }
    }
}

impl BufferAllocator for PooledBufferAllocator {
    fn name(&self) -> &'static str {
        "pooled"
    }

    fn allocate(&self, size: usize, alignment: usize, context: usize) -> Allocations {
        let alignment = alignment.max(1);
        let mut guard = self.lock();
        let state = &mut *guard;

        let pool = match state.pool.take() {
            Some(pool) => pool,
            None => match self.create_pool(state) {
                Ok(pool) => pool,
                Err(err) => {
                    tracing::warn!(size, error = %err, "could not create decoder buffer pool");
                    state.stats.record_denial();
                    return Allocations::empty();
                }
            },
        };
        let pool = state.pool.insert(pool);

        let Some(ptr) = pool.allocate(size, alignment) else {
            tracing::debug!(
                size,
                alignment,
                capacity = pool.capacity(),
                max_capacity = pool.max_capacity(),
                "buffer allocation denied"
            );
            state.stats.record_denial();
            self.release_if_drained(state);
            return Allocations::empty();
        };

        if pool.capacity_exceeded() {
            tracing::warn!(
                size,
                capacity = pool.capacity(),
                max_capacity = pool.max_capacity(),
                "pool capacity exceeds its ceiling; rejecting allocation"
            );
            pool.free(ptr);
            state.stats.record_denial();
            self.release_if_drained(state);
            return Allocations::empty();
        }

        let (allocated, capacity) = (pool.allocated(), pool.capacity());
        state.stats.record_allocation(allocated, capacity);
        if state.stats.update_allocation_record(allocated, capacity) {
            tracing::info!(
                allocated,
                capacity,
                max_capacity = pool.max_capacity(),
                "new decoder buffer allocation record"
            );
        }
        tracing::trace!(ptr = ?ptr, size, alignment, context, "allocate");

        Allocations::single(Buffer::new(ptr, size, alignment, self.id))
    }

    fn free(&self, mut allocations: Allocations) {
        let buffers = allocations.take_buffers_owned_by(self.id, self.name());
        if buffers.is_empty() {
            return;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pool) = state.pool.as_mut() else {
            panic!("free of {} buffers with no live decoder buffer pool", buffers.len());
        };

        for buffer in &buffers {
            tracing::trace!(ptr = ?buffer.ptr(), size = buffer.size(), "free");
            pool.free(buffer.ptr());
        }
        state.stats.record_frees(buffers.len());
        self.release_if_drained(state);
    }

    fn update_video_config(&self, video: &VideoConfig) {
        let budget = self.budget_for(video);
        let mut state = self.lock();
        state.video = *video;
        if let Some(pool) = state.pool.as_mut() {
            pool.increase_max_capacity_if_necessary(budget);
        }
        tracing::info!(video = %video, budget, "video config updated");
    }

    fn suspend(&self) {
        if self.on_demand {
            return;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(allocated) = state.pool.as_ref().map(ReuseAllocator::allocated) else {
            return;
        };
        if allocated == 0 {
            self.release_pool(state, "suspended");
        } else {
            tracing::info!(allocated, "pool busy on suspend; releasing once drained");
            state.suspend_pending = true;
        }
    }

    fn resume(&self) {
        if self.on_demand {
            return;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        state.suspend_pending = false;
        if state.pool.is_none() {
            match self.create_pool(state) {
                Ok(pool) => state.pool = Some(pool),
                // The next allocation retries the reservation.
                Err(err) => tracing::warn!(error = %err, "could not re-create decoder buffer pool on resume"),
            }
        }
    }

    fn allocated_memory(&self) -> usize {
        self.lock().pool.as_ref().map_or(0, ReuseAllocator::allocated)
    }

    fn current_memory_capacity(&self) -> usize {
        self.lock().pool.as_ref().map_or(0, ReuseAllocator::capacity)
    }

    fn maximum_memory_capacity(&self) -> usize {
        let state = self.lock();
        if !state.video.is_known() {
            return 0;
        }
        match &state.pool {
            Some(pool) => pool.max_capacity(),
            None => self.budget_for(&state.video),
        }
    }

    fn stats(&self) -> BufferPoolStats {
        self.lock().stats.clone()
    }
}

impl Drop for PooledBufferAllocator {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = state.pool.take() {
            if pool.allocated() != 0 {
                tracing::error!(
                    allocated = pool.allocated(),
                    live_blocks = pool.live_blocks(),
                    "decoder buffer pool dropped with live buffers; leaking its arena"
                );
                // Outstanding records still point into the arena.
                std::mem::forget(pool);
            }
        }
    }
}

impl std::fmt::Debug for PooledBufferAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBufferAllocator")
            .field("id", &self.id)
            .field("on_demand", &self.on_demand)
            .field("pool_config", &self.pool_config)
            .field("state", &*self.lock())
            .finish()
    }
}
