// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the decoder buffer pool.
//!
//! Allocation denial is not an error: it is reported as an empty
//! [`Allocations`](crate::Allocations) record. These errors cover
//! configuration and pool construction only.

/// Errors that can occur while configuring or constructing a buffer pool.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// A size string could not be parsed.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// The pool configuration is inconsistent or could not be loaded.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The initial arena reservation was refused.
    #[error("pool reservation failed: {0}")]
    Reservation(#[from] reuse_allocator::ReuseError),
}
