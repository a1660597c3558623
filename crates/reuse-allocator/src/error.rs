// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the reuse allocator.
//!
//! Allocation denial is not an error here: [`ReuseAllocator::allocate`]
//! returns `None` for it. Errors are reserved for construction and integrity
//! checks.
//!
//! [`ReuseAllocator::allocate`]: crate::ReuseAllocator::allocate

/// Errors reported by a [`ReuseAllocator`](crate::ReuseAllocator).
#[derive(Debug, thiserror::Error)]
pub enum ReuseError {
    /// The fallback allocator refused the initial arena reservation.
    #[error("fallback allocator refused initial reservation of {requested_bytes} bytes")]
    ReservationFailed { requested_bytes: usize },

    /// An internal free-list or accounting inconsistency was detected.
    #[error("pool integrity error: {0}")]
    Corrupted(String),
}
