// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Platform capabilities consulted by the buffer pool.
//!
//! The pool asks the platform two kinds of question: fixed policy flags
//! (is pooling enabled, is the pool created on demand, how big is the
//! initial reservation and the growth unit), and the maximum byte budget for
//! a given video configuration. [`PlatformCapabilities`] is that interface;
//! [`BudgetRule`] tables are the data-driven way to answer the second part.

use crate::{ByteSize, VideoCodec, VideoConfig};

/// Requests below this many bytes are placed from the low end of the arena.
pub const DEFAULT_SMALL_ALLOCATION_THRESHOLD: usize = 512;

/// What the platform tells the pool about itself.
///
/// Implementations must be thread-safe: the budget may be looked up from
/// whichever thread delivers a video configuration change.
pub trait PlatformCapabilities: Send + Sync {
    /// Whether buffers come from a pool at all.
    fn uses_memory_pool(&self) -> bool;

    /// Whether the pool is created lazily on first allocation and released
    /// as soon as it drains.
    fn allocates_pool_on_demand(&self) -> bool;

    /// Bytes reserved when a pool is created.
    fn initial_capacity(&self) -> usize;

    /// Growth granularity of the pool's arena.
    fn allocation_unit(&self) -> usize;

    /// Requests below this size are placed from the low end of the arena.
    fn small_allocation_threshold(&self) -> usize {
        DEFAULT_SMALL_ALLOCATION_THRESHOLD
    }

    /// Maximum bytes the pool may reserve for `video`. `0` means unbounded.
    fn max_buffer_capacity(&self, video: &VideoConfig) -> usize;
}

/// One row of a budget table.
///
/// A rule applies to streams whose codec matches (a missing codec matches
/// every codec) and whose resolution and bit depth are within its limits.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BudgetRule {
    /// Codec this rule is for; absent for a wildcard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<VideoCodec>,
    pub max_width: u32,
    pub max_height: u32,
    #[serde(default = "default_max_bits_per_pixel")]
    pub max_bits_per_pixel: u32,
    /// Maximum pool capacity for matching streams.
    pub capacity: ByteSize,
}

fn default_max_bits_per_pixel() -> u32 {
    8
}

impl BudgetRule {
    /// A wildcard rule covering every codec.
    pub fn any_codec(max_width: u32, max_height: u32, max_bits_per_pixel: u32, capacity: ByteSize) -> Self {
        Self {
            codec: None,
            max_width,
            max_height,
            max_bits_per_pixel,
            capacity,
        }
    }

    /// Returns true if the rule is for `codec` or is a wildcard.
    pub fn matches_codec(&self, codec: VideoCodec) -> bool {
        self.codec.map_or(true, |c| c == codec)
    }

    /// Returns true if the rule matches the codec and covers the stream.
    pub fn covers(&self, video: &VideoConfig) -> bool {
        self.matches_codec(video.codec)
            && video.width <= self.max_width
            && video.height <= self.max_height
            && video.bits_per_pixel <= self.max_bits_per_pixel
    }
}

/// Looks up the budget for `video` in `rules`.
///
/// - An unknown codec yields `0` (unbounded).
/// - Otherwise the first rule that covers the stream wins.
/// - A stream larger than every rule for its codec gets the largest budget
///   among those rules.
/// - No rule for the codec at all yields `0`.
pub fn lookup_budget(rules: &[BudgetRule], video: &VideoConfig) -> usize {
    if !video.is_known() {
        return 0;
    }
    if let Some(rule) = rules.iter().find(|r| r.covers(video)) {
        return rule.capacity.as_bytes();
    }
    rules
        .iter()
        .filter(|r| r.matches_codec(video.codec))
        .map(|r| r.capacity.as_bytes())
        .max()
        .unwrap_or(0)
}

/// The built-in budget table: 1080p and 2160p at 8 and 10 bits, any codec.
pub fn default_budget_rules() -> Vec<BudgetRule> {
    vec![
        BudgetRule::any_codec(1920, 1080, 8, ByteSize::from_mb(30)),
        BudgetRule::any_codec(1920, 1080, 10, ByteSize::from_mb(36)),
        BudgetRule::any_codec(3840, 2160, 8, ByteSize::from_mb(65)),
        BudgetRule::any_codec(3840, 2160, 10, ByteSize::from_mb(80)),
    ]
}
