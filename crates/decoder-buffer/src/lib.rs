// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # decoder-buffer
//!
//! Memory for media decoder input and output buffers on resource-constrained
//! playback devices.
//!
//! # Key Components
//!
//! - [`BufferAllocator`]: the interface the media pipeline allocates and
//!   frees through. Chosen once by [`create_allocator`]:
//!   - [`PooledBufferAllocator`] carves buffers out of a
//!     [`ReuseAllocator`](reuse_allocator::ReuseAllocator) arena whose ceiling
//!     follows the active video stream's budget. The arena is released on
//!     suspend, or as soon as it drains when created on demand.
//!   - [`DirectBufferAllocator`] sends every request to the platform.
//! - [`Allocations`]: the record returned by one allocation, possibly
//!   several buffers for multi-planar pictures. Empty means "denied, try
//!   again later".
//! - [`PlatformCapabilities`]: policy flags and per-stream budgets.
//!   [`BufferPoolConfig`] implements it from a TOML file.
//! - [`BufferPoolStats`]: counters, peaks and allocation records.
//!
//! # Example
//! ```
//! use decoder_buffer::{BufferPoolConfig, VideoCodec, VideoConfig};
//!
//! let allocator = BufferPoolConfig::default().create_allocator().unwrap();
//! allocator.update_video_config(&VideoConfig::new(VideoCodec::Vp9, 1920, 1080, 8));
//!
//! let record = allocator.allocate(256 * 1024, 16, 0);
//! assert!(!record.is_empty());
//! assert_eq!(allocator.allocated_memory(), 256 * 1024);
//!
//! allocator.free(record);
//! assert_eq!(allocator.allocated_memory(), 0);
//! ```

pub mod capabilities;
pub mod config;
pub mod error;
pub mod record;
pub mod size;
pub mod stats;
pub mod strategy;
pub mod video;

pub use capabilities::{default_budget_rules, lookup_budget, BudgetRule, PlatformCapabilities};
pub use config::BufferPoolConfig;
pub use error::BufferError;
pub use record::{Allocations, Buffer};
pub use reuse_allocator::{BoundedAllocator, FallbackAllocator, SystemAllocator};
pub use size::ByteSize;
pub use stats::BufferPoolStats;
pub use strategy::{create_allocator, BufferAllocator, DirectBufferAllocator, PooledBufferAllocator};
pub use video::{VideoCodec, VideoConfig};
