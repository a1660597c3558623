// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `bufpool inspect` command: display the pool policy and budget table.

use super::{banner, mb};
use decoder_buffer::{BufferPoolConfig, ByteSize, PlatformCapabilities, VideoCodec, VideoConfig};

/// Resolutions the budget is shown for.
const STREAMS: [(u32, u32, &str); 5] = [
    (640, 480, "480p"),
    (1280, 720, "720p"),
    (1920, 1080, "1080p"),
    (3840, 2160, "2160p"),
    (7680, 4320, "4320p"),
];

pub async fn execute(config: BufferPoolConfig) -> anyhow::Result<()> {
    banner("Pool Inspector");

    // ── Policy ─────────────────────────────────────────────────
    println!("  Policy:");
    println!(
        "   Strategy:          {}",
        if config.using_memory_pool { "pooled" } else { "direct" }
    );
    println!(
        "   Pool creation:     {}",
        if config.allocate_on_demand { "on demand" } else { "eager" }
    );
    println!("   Initial capacity:  {}", config.initial_capacity);
    println!("   Allocation unit:   {}", config.allocation_unit);
    println!("   Small threshold:   {} B", config.small_allocation_threshold);
    println!();

    // ── Budget Table ───────────────────────────────────────────
    println!("  Budget rules (first match wins):");
    println!(
        "  {:<4} {:<8} {:>12} {:>6} {:>10}",
        "#", "Codec", "Max size", "Bits", "Capacity"
    );
    println!("  {}", "-".repeat(44));
    for (i, rule) in config.budgets.iter().enumerate() {
        println!(
            "  {:<4} {:<8} {:>12} {:>6} {:>10}",
            i,
            rule.codec.map_or("any", |c| c.name()),
            format!("{}x{}", rule.max_width, rule.max_height),
            rule.max_bits_per_pixel,
            rule.capacity.to_string(),
        );
    }
    println!();

    // ── Budgets for Common Streams ─────────────────────────────
    println!("  Budget by stream (MB, 0 = unbounded):");
    println!(
        "  {:<8} {:>10} {:>10}",
        "Stream", "8-bit", "10-bit"
    );
    println!("  {}", "-".repeat(30));
    for (width, height, label) in STREAMS {
        let budget = |bits| {
            let video = VideoConfig::new(VideoCodec::Vp9, width, height, bits);
            mb(config.max_buffer_capacity(&video))
        };
        println!("  {:<8} {:>10.1} {:>10.1}", label, budget(8), budget(10));
    }
    println!();

    let unknown = config.max_buffer_capacity(&VideoConfig::default());
    println!(
        "  Before the first video config the ceiling is {}.",
        if unknown == 0 {
            "unbounded".to_string()
        } else {
            ByteSize::from_bytes(unknown).to_string()
        }
    );
    println!();
    Ok(())
}
