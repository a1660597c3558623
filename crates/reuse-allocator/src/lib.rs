// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # reuse-allocator
//!
//! A bidirectional-fit arena allocator for buffers that are allocated and
//! freed at high frequency, such as media decoder input and output buffers
//! on memory-constrained playback devices.
//!
//! # Key Components
//!
//! - [`ReuseAllocator`]: the arena: places requests, grows in
//!   `allocation_unit` steps up to an optional ceiling, and coalesces freed
//!   blocks with their neighbours.
//! - [`FallbackAllocator`]: where arena regions come from. [`SystemAllocator`]
//!   uses the global Rust allocator; [`BoundedAllocator`] caps any fallback
//!   at a fixed number of bytes.
//! - [`MemoryBlock`]: an `(address, size)` range, as reported by
//!   [`ReuseAllocator::free_blocks`].
//!
//! # Placement
//!
//! ```text
//!  low addresses                                         high addresses
//!  ┌──────────────┬───────────────────────────┬──────────────────────┐
//!  │ small (audio)│          free             │  large (video)       │
//!  │  → grows up  │                           │  grows down ←        │
//!  └──────────────┴───────────────────────────┴──────────────────────┘
//! ```
//!
//! Requests below the small-allocation threshold are carved from the front
//! of the smallest fitting block nearest the low end; the rest from the back
//! of the smallest fitting block nearest the high end. Keeping short-lived
//! small buffers away from long-lived large ones limits fragmentation.

mod allocator;
mod block;
mod error;
mod fallback;

pub use allocator::{ReuseAllocator, ReuseConfig};
pub use block::{MemoryBlock, MIN_ALIGNMENT, MIN_BLOCK_SIZE};
pub use error::ReuseError;
pub use fallback::{BoundedAllocator, FallbackAllocator, SystemAllocator};
