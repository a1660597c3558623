// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bidirectional-fit reuse allocator with budget enforcement.
//!
//! The [`ReuseAllocator`] carves caller requests out of an arena made of one
//! or more regions obtained from a [`FallbackAllocator`]. It:
//!
//! 1. Keeps free space as an address-ordered map of `(address, size)` pairs.
//!    Adjacent free entries are always merged.
//! 2. Places small requests at the low end of the arena and large requests
//!    at the high end (bidirectional fit), choosing the smallest fitting
//!    block in the preferred direction.
//! 3. Grows the arena in `allocation_unit` steps when nothing fits, unless
//!    growth would take the reserved capacity past `max_capacity`.
//!
//! # Thread Safety
//! `ReuseAllocator` is `Send` but requires `&mut self` for every mutation.
//! Callers share it behind a `Mutex`.
//!
//! # Accounting
//! Alignment padding and split leftovers too small to keep are counted as
//! part of the live block, so `allocated() == capacity() - free_bytes()`
//! holds exactly after every operation.

use crate::block::{align_down, round_up, CarveFrom, MemoryBlock, MIN_ALIGNMENT, MIN_BLOCK_SIZE};
use crate::{FallbackAllocator, ReuseError};
use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::sync::Arc;

/// Construction parameters for a [`ReuseAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReuseConfig {
    /// Bytes reserved up front. Clamped to a non-zero `max_capacity`.
    pub initial_capacity: usize,
    /// Requests smaller than this are placed from the low end of the arena.
    pub small_allocation_threshold: usize,
    /// Growth granularity. `0` grows by exactly what a request needs.
    pub allocation_unit: usize,
    /// Ceiling on reserved capacity. `0` means unbounded.
    pub max_capacity: usize,
}

impl Default for ReuseConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            small_allocation_threshold: 512,
            allocation_unit: 0,
            max_capacity: 0,
        }
    }
}

/// A region obtained from the fallback allocator.
struct Region {
    ptr: NonNull<u8>,
    size: usize,
    alignment: usize,
}

impl Region {
    fn contains(&self, address: usize) -> bool {
        let start = self.ptr.as_ptr() as usize;
        address >= start && address < start + self.size
    }
}

/// The arena allocator behind the decoder buffer pool.
///
/// # Example
/// ```
/// use reuse_allocator::{ReuseAllocator, ReuseConfig, SystemAllocator};
/// use std::sync::Arc;
///
/// let config = ReuseConfig {
///     initial_capacity: 64 * 1024,
///     ..Default::default()
/// };
/// let mut pool = ReuseAllocator::new(Arc::new(SystemAllocator), config).unwrap();
///
/// let p = pool.allocate(4096, 16).unwrap();
/// assert_eq!(p.as_ptr() as usize % 16, 0);
/// assert_eq!(pool.allocated(), 4096);
///
/// pool.free(p);
/// assert_eq!(pool.allocated(), 0);
/// assert_eq!(pool.capacity(), 64 * 1024);
/// ```
pub struct ReuseAllocator {
    fallback: Arc<dyn FallbackAllocator>,
    small_allocation_threshold: usize,
    allocation_unit: usize,
    max_capacity: usize,
    /// Bytes reserved from the fallback allocator.
    capacity: usize,
    /// Bytes in live blocks, padding included.
    total_allocated: usize,
    /// Free space: start address → size.
    free_blocks: BTreeMap<usize, usize>,
    /// Live blocks keyed by the address handed to the caller.
    allocated_blocks: HashMap<usize, MemoryBlock>,
    regions: Vec<Region>,
}

impl ReuseAllocator {
    /// Creates an allocator and reserves its initial capacity.
    ///
    /// Returns [`ReuseError::ReservationFailed`] if the fallback allocator
    /// refuses the initial reservation.
    pub fn new(fallback: Arc<dyn FallbackAllocator>, config: ReuseConfig) -> Result<Self, ReuseError> {
        let mut allocator = Self {
            fallback,
            small_allocation_threshold: config.small_allocation_threshold,
            allocation_unit: config.allocation_unit,
            max_capacity: config.max_capacity,
            capacity: 0,
            total_allocated: 0,
            free_blocks: BTreeMap::new(),
            allocated_blocks: HashMap::new(),
            regions: Vec::new(),
        };

        let mut initial = round_up(config.initial_capacity, MIN_BLOCK_SIZE).unwrap_or(usize::MAX);
        if config.max_capacity != 0 && initial > config.max_capacity {
            initial = align_down(config.max_capacity, MIN_BLOCK_SIZE);
        }
        if initial > 0 && allocator.reserve(initial, MIN_ALIGNMENT).is_none() {
            return Err(ReuseError::ReservationFailed {
                requested_bytes: initial,
            });
        }

        Ok(allocator)
    }

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// Returns `None` when no free block fits and the arena cannot grow,
    /// either because growth would exceed `max_capacity` or because the
    /// fallback allocator refused. `alignment` must be a power of two
    /// (`0` is treated as `1`); other values are denied.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let alignment = alignment.max(1);
        if !alignment.is_power_of_two() {
            tracing::warn!(alignment, "denying allocation with non-power-of-two alignment");
            return None;
        }
        let alignment = alignment.max(MIN_ALIGNMENT);
        let size = round_up(size.max(MIN_BLOCK_SIZE), MIN_BLOCK_SIZE)?;

        let from = if size < self.small_allocation_threshold {
            CarveFrom::Front
        } else {
            CarveFrom::Back
        };

        let block = match self.find_free_block(size, alignment, from) {
            Some(block) => block,
            None => {
                self.expand_to_fit(size, alignment)?;
                self.find_free_block(size, alignment, from)?
            }
        };

        let carved = block.carve(size, alignment, from);
        let ptr = self.pointer_at(carved.user_address)?;

        self.free_blocks.remove(&block.address());
        if let Some(remainder) = carved.remainder {
            // The remainder's only neighbour is the block just carved off,
            // so no merge is needed.
            self.free_blocks.insert(remainder.address(), remainder.size());
        }
        self.allocated_blocks.insert(carved.user_address, carved.allocated);
        self.total_allocated += carved.allocated.size();

        Some(ptr)
    }

    /// Returns a live allocation to the free list.
    ///
    /// # Panics
    /// Panics if `ptr` is not a live allocation of this allocator. Double
    /// frees and foreign pointers are contract violations; continuing would
    /// corrupt the free list.
    pub fn free(&mut self, ptr: NonNull<u8>) {
        if !self.try_free(ptr) {
            panic!("free of {ptr:p}, which is not a live allocation of this pool");
        }
    }

    /// Returns a live allocation to the free list, reporting whether `ptr`
    /// was live.
    pub fn try_free(&mut self, ptr: NonNull<u8>) -> bool {
        let Some(block) = self.allocated_blocks.remove(&(ptr.as_ptr() as usize)) else {
            return false;
        };

        debug_assert!(block.size() <= self.total_allocated);
        self.total_allocated -= block.size();
        self.add_free_block(block);
        true
    }

    /// Bytes currently in live blocks.
    pub fn allocated(&self) -> usize {
        self.total_allocated
    }

    /// Bytes currently reserved from the fallback allocator.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current ceiling on capacity. `0` means unbounded.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Raises the ceiling to `new_max` if that is higher. Never lowers it.
    ///
    /// An unbounded allocator (`max_capacity == 0`) becomes bounded by any
    /// non-zero `new_max`.
    pub fn increase_max_capacity_if_necessary(&mut self, new_max: usize) {
        if new_max > self.max_capacity {
            tracing::debug!(
                from = self.max_capacity,
                to = new_max,
                "raising reuse allocator max capacity"
            );
            self.max_capacity = new_max;
        }
    }

    /// Returns true if the reserved capacity is past a non-zero ceiling.
    ///
    /// Growth is checked against the ceiling, so this only happens when a
    /// ceiling is introduced after the arena already grew beyond it.
    pub fn capacity_exceeded(&self) -> bool {
        self.max_capacity != 0 && self.capacity > self.max_capacity
    }

    /// Requests smaller than this are placed from the low end.
    pub fn small_allocation_threshold(&self) -> usize {
        self.small_allocation_threshold
    }

    /// Growth granularity in bytes.
    pub fn allocation_unit(&self) -> usize {
        self.allocation_unit
    }

    /// Total bytes on the free list.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks.values().sum()
    }

    /// Snapshot of the free list in address order.
    pub fn free_blocks(&self) -> Vec<MemoryBlock> {
        self.free_blocks
            .iter()
            .map(|(&address, &size)| MemoryBlock::new(address, size))
            .collect()
    }

    /// Number of live allocations.
    pub fn live_blocks(&self) -> usize {
        self.allocated_blocks.len()
    }

    /// Number of regions obtained from the fallback allocator.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Live block sizes → number of live blocks of that size.
    pub fn allocation_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for block in self.allocated_blocks.values() {
            *histogram.entry(block.size()).or_insert(0) += 1;
        }
        histogram
    }

    /// Free block sizes → number of free blocks of that size.
    pub fn free_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for &size in self.free_blocks.values() {
            *histogram.entry(size).or_insert(0) += 1;
        }
        histogram
    }

    /// Logs live and free block size histograms at `info` level.
    pub fn log_allocations(&self) {
        tracing::info!(
            "total allocation: {} bytes in {} blocks",
            self.total_allocated,
            self.allocated_blocks.len()
        );
        for (size, count) in self.allocation_histogram() {
            tracing::info!("\t{size} : {count}");
        }
        tracing::info!("total free blocks: {}", self.free_blocks.len());
        for (size, count) in self.free_histogram() {
            tracing::info!("\t{size} : {count}");
        }
    }

    /// Verifies the free list and accounting.
    ///
    /// Checks that free blocks are ordered, non-overlapping and coalesced,
    /// that no live block overlaps any other block, and that
    /// `allocated + free == capacity`.
    pub fn check_integrity(&self) -> Result<(), ReuseError> {
        let free = self.free_blocks();
        for pair in free.windows(2) {
            if pair[0].end() > pair[1].address() {
                return Err(ReuseError::Corrupted(format!(
                    "free blocks overlap: {:?} and {:?}",
                    pair[0], pair[1]
                )));
            }
            if pair[0].end() == pair[1].address() {
                return Err(ReuseError::Corrupted(format!(
                    "adjacent free blocks not coalesced: {:?} and {:?}",
                    pair[0], pair[1]
                )));
            }
        }

        let live_total: usize = self.allocated_blocks.values().map(MemoryBlock::size).sum();
        if live_total != self.total_allocated {
            return Err(ReuseError::Corrupted(format!(
                "live blocks sum to {live_total} but allocated is {}",
                self.total_allocated
            )));
        }

        let free_total: usize = free.iter().map(MemoryBlock::size).sum();
        if free_total + self.total_allocated != self.capacity {
            return Err(ReuseError::Corrupted(format!(
                "allocated {} + free {free_total} != capacity {}",
                self.total_allocated, self.capacity
            )));
        }

        let mut all: Vec<MemoryBlock> = free;
        all.extend(self.allocated_blocks.values().copied());
        all.sort_by_key(MemoryBlock::address);
        for pair in all.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(ReuseError::Corrupted(format!(
                    "blocks overlap: {:?} and {:?}",
                    pair[0], pair[1]
                )));
            }
        }

        for (&user_address, block) in &self.allocated_blocks {
            if user_address < block.address() || user_address >= block.end() {
                return Err(ReuseError::Corrupted(format!(
                    "live address {user_address:#x} outside its block {block:?}"
                )));
            }
        }

        Ok(())
    }

    /// Picks the smallest block that fits, searching from the low end for
    /// front placement and from the high end for back placement. Ties go to
    /// the block met first.
    fn find_free_block(&self, size: usize, alignment: usize, from: CarveFrom) -> Option<MemoryBlock> {
        let fits = |(&address, &len): (&usize, &usize)| {
            let block = MemoryBlock::new(address, len);
            block.can_fulfill(size, alignment).then_some(block)
        };

        match from {
            CarveFrom::Front => self.free_blocks.iter().filter_map(fits).min_by_key(MemoryBlock::size),
            CarveFrom::Back => self
                .free_blocks
                .iter()
                .rev()
                .filter_map(fits)
                .min_by_key(MemoryBlock::size),
        }
    }

    /// Grows the arena so that a `size`-byte request at `alignment` fits.
    fn expand_to_fit(&mut self, size: usize, alignment: usize) -> Option<()> {
        let mut increment = round_up(size, self.allocation_unit)
            .and_then(|v| round_up(v, MIN_BLOCK_SIZE))
            .unwrap_or(size);

        if self.max_capacity != 0 {
            let headroom = self.max_capacity.saturating_sub(self.capacity);
            if size > headroom {
                tracing::debug!(
                    size,
                    capacity = self.capacity,
                    max_capacity = self.max_capacity,
                    "growth denied by max capacity"
                );
                return None;
            }
            if increment > headroom {
                increment = size;
            }
        }

        if self.reserve(increment, alignment).is_some() {
            return Some(());
        }
        if increment > size && self.reserve(size, alignment).is_some() {
            return Some(());
        }

        tracing::warn!(size, increment, "fallback allocator refused arena growth");
        None
    }

    /// Obtains a new region and adds it to the free list.
    fn reserve(&mut self, size: usize, alignment: usize) -> Option<MemoryBlock> {
        let alignment = alignment.max(MIN_ALIGNMENT);
        let ptr = self.fallback.allocate(size, alignment)?;

        self.regions.push(Region { ptr, size, alignment });
        self.capacity += size;
        tracing::debug!(size, capacity = self.capacity, "reuse allocator reserved region");

        Some(self.add_free_block(MemoryBlock::new(ptr.as_ptr() as usize, size)))
    }

    /// Inserts `block` into the free list, merging with adjacent neighbours.
    /// Returns the block as finally stored.
    fn add_free_block(&mut self, block: MemoryBlock) -> MemoryBlock {
        let mut merged = block;

        if let Some(right_size) = self.free_blocks.remove(&merged.end()) {
            merged = MemoryBlock::new(merged.address(), merged.size() + right_size);
        }

        let left = self
            .free_blocks
            .range(..merged.address())
            .next_back()
            .map(|(&address, &size)| MemoryBlock::new(address, size));
        if let Some(left) = left {
            debug_assert!(left.end() <= merged.address(), "free block overlap");
            if left.end() == merged.address() {
                self.free_blocks.remove(&left.address());
                merged = MemoryBlock::new(left.address(), left.size() + merged.size());
            }
        }

        self.free_blocks.insert(merged.address(), merged.size());
        merged
    }

    /// Re-derives a pointer for `address` from the region that contains it.
    fn pointer_at(&self, address: usize) -> Option<NonNull<u8>> {
        let region = self.regions.iter().find(|r| r.contains(address))?;
        let offset = address - region.ptr.as_ptr() as usize;
        // SAFETY: `offset` is within the region, checked by `contains`.
        NonNull::new(unsafe { region.ptr.as_ptr().add(offset) })
    }
}

impl Drop for ReuseAllocator {
    fn drop(&mut self) {
        if !self.allocated_blocks.is_empty() {
            tracing::error!("{} blocks still allocated.", self.allocated_blocks.len());
        }
        for region in self.regions.drain(..) {
            // SAFETY: each region was obtained from `self.fallback` with
            // exactly this size and alignment, and is released once.
            unsafe {
                self.fallback.deallocate(region.ptr, region.size, region.alignment);
            }
        }
    }
}

// ReuseAllocator holds raw region pointers, but it owns those regions
// exclusively and the fallback allocator is Send + Sync.
unsafe impl Send for ReuseAllocator {}

impl std::fmt::Debug for ReuseAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReuseAllocator")
            .field("capacity", &self.capacity)
            .field("max_capacity", &self.max_capacity)
            .field("allocated", &self.total_allocated)
            .field("free_blocks", &self.free_blocks.len())
            .field("live_blocks", &self.allocated_blocks.len())
            .finish()
    }
}
