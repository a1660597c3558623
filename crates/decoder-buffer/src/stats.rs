// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for diagnostics and budget tuning.
//!
//! [`BufferPoolStats`] is owned by the allocator and updated under the same
//! lock as allocation and free. Besides counters and peaks it keeps an
//! "allocation record": high-water marks that only advance in steps of
//! [`RECORD_GRANULARITY`], so that new records are rare enough to log.

/// Minimum growth before a new allocation record is reported.
pub const RECORD_GRANULARITY: usize = 512 * 1024;

/// Cumulative statistics about buffer pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferPoolStats {
    /// Number of allocation requests.
    pub total_allocations: u64,
    /// Requests that returned an empty record.
    pub denied_allocations: u64,
    /// Number of buffers returned.
    pub total_frees: u64,
    /// Highest allocated byte count observed.
    pub peak_allocated_bytes: usize,
    /// Highest reserved capacity observed.
    pub peak_capacity_bytes: usize,
    /// Number of pools created (eagerly, lazily or on resume).
    pub pools_created: u64,
    /// Number of pools released (on suspend or when drained on demand).
    pub pools_released: u64,
    /// Allocated bytes at the last reported allocation record.
    pub record_allocated_bytes: usize,
    /// Capacity at the last reported allocation record.
    pub record_capacity_bytes: usize,
}

impl BufferPoolStats {
    /// Creates statistics whose allocation record starts at half of
    /// `initial_capacity` allocated and `initial_capacity` reserved, so the
    /// initial reservation alone is never reported.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            record_allocated_bytes: initial_capacity / 2,
            record_capacity_bytes: initial_capacity,
            ..Default::default()
        }
    }

    /// Fraction of requests that were denied, in `[0.0, 1.0]`.
    pub fn denial_ratio(&self) -> f64 {
        if self.total_allocations == 0 {
            return 0.0;
        }
        self.denied_allocations as f64 / self.total_allocations as f64
    }

    /// Records a successful allocation and the pool state after it.
    pub(crate) fn record_allocation(&mut self, allocated: usize, capacity: usize) {
        self.total_allocations += 1;
        self.update_peaks(allocated, capacity);
    }

    /// Records a denied allocation.
    pub(crate) fn record_denial(&mut self) {
        self.total_allocations += 1;
        self.denied_allocations += 1;
    }

    /// Records `count` buffers being returned.
    pub(crate) fn record_frees(&mut self, count: usize) {
        self.total_frees += count as u64;
    }

    pub(crate) fn record_pool_created(&mut self, capacity: usize) {
        self.pools_created += 1;
        self.update_peaks(0, capacity);
    }

    pub(crate) fn record_pool_released(&mut self) {
        self.pools_released += 1;
    }

    pub(crate) fn update_peaks(&mut self, allocated: usize, capacity: usize) {
        self.peak_allocated_bytes = self.peak_allocated_bytes.max(allocated);
        self.peak_capacity_bytes = self.peak_capacity_bytes.max(capacity);
    }

    /// Advances the allocation record if either figure grew by more than
    /// [`RECORD_GRANULARITY`]. Returns true if a new record was set.
    pub(crate) fn update_allocation_record(&mut self, allocated: usize, capacity: usize) -> bool {
        let mut new_record = false;
        if allocated > self.record_allocated_bytes + RECORD_GRANULARITY {
            self.record_allocated_bytes = allocated;
            new_record = true;
        }
        if capacity > self.record_capacity_bytes + RECORD_GRANULARITY {
            self.record_capacity_bytes = capacity;
            new_record = true;
        }
        new_record
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let mb = |bytes: usize| bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Allocations: {} total ({} denied, {:.1}% denial rate), {} frees, \
             peak {:.2} MB allocated / {:.2} MB reserved, {} pools created, {} released",
            self.total_allocations,
            self.denied_allocations,
            self.denial_ratio() * 100.0,
            self.total_frees,
            mb(self.peak_allocated_bytes),
            mb(self.peak_capacity_bytes),
            self.pools_created,
            self.pools_released,
        )
    }
}
