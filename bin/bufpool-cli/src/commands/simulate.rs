// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `bufpool simulate` command: synthetic multi-threaded playback.
//!
//! Three blocking tasks share one allocator:
//! ```text
//! decoder   ── allocate video + audio buffers, hold `depth` frames, free oldest
//! control   ── switch between streams (update_video_config)
//! lifecycle ── suspend / resume
//! ```
//! A denied allocation is a decoder stall: the oldest frame is released and
//! the frame is retried once.

use super::{banner, mb, print_stats};
use decoder_buffer::{Allocations, BufferAllocator, BufferPoolConfig, BufferPoolStats, VideoCodec, VideoConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Streams the control task switches between.
const STREAMS: [VideoConfig; 4] = [
    VideoConfig { codec: VideoCodec::H264, width: 1280, height: 720, bits_per_pixel: 8 },
    VideoConfig { codec: VideoCodec::Vp9, width: 1920, height: 1080, bits_per_pixel: 8 },
    VideoConfig { codec: VideoCodec::Vp9, width: 1920, height: 1080, bits_per_pixel: 10 },
    VideoConfig { codec: VideoCodec::Av1, width: 3840, height: 2160, bits_per_pixel: 10 },
];

/// Results of a simulated session.
#[derive(Debug, serde::Serialize)]
struct Report {
    frames: usize,
    video_denials: usize,
    audio_denials: usize,
    dropped_frames: usize,
    stream_changes: usize,
    suspends: usize,
    elapsed_ms: u128,
    stats: BufferPoolStats,
}

/// Compressed size of one video access unit for `video`: roughly one bit
/// per pixel, scaled by bit depth and a random factor.
fn video_frame_size(video: &VideoConfig, rng: &mut impl Rng) -> usize {
    let pixels = video.width as usize * video.height as usize;
    let base = pixels * video.bits_per_pixel as usize / 64;
    base * rng.gen_range(50..150) / 100
}

pub async fn execute(
    config: BufferPoolConfig,
    frames: usize,
    seed: u64,
    depth: usize,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        banner("Playback Simulator");
        println!("  Frames: {frames}   Seed: {seed}   Depth: {depth}");
        println!();
    }

    let allocator: Arc<dyn BufferAllocator> = Arc::from(config.create_allocator()?);
    let stream = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    allocator.update_video_config(&STREAMS[0]);

    let started = Instant::now();

    let decoder = {
        let allocator = Arc::clone(&allocator);
        let stream = Arc::clone(&stream);
        let done = Arc::clone(&done);
        let depth = depth.max(1);
        tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut in_flight: VecDeque<Allocations> = VecDeque::with_capacity(depth * 2);
            let (mut video_denials, mut audio_denials, mut dropped) = (0, 0, 0);

            for frame in 0..frames {
                let video = STREAMS[stream.load(Ordering::Acquire) % STREAMS.len()];
                let size = video_frame_size(&video, &mut rng);

                let mut record = allocator.allocate(size, 64, frame);
                if record.is_empty() {
                    video_denials += 1;
                    if let Some(oldest) = in_flight.pop_front() {
                        allocator.free(oldest);
                    }
                    record = allocator.allocate(size, 64, frame);
                    if record.is_empty() {
                        dropped += 1;
                        continue;
                    }
                }
                in_flight.push_back(record);

                let audio = allocator.allocate(rng.gen_range(256..4096), 16, frame);
                if audio.is_empty() {
                    audio_denials += 1;
                } else {
                    in_flight.push_back(audio);
                }

                while in_flight.len() > depth * 2 {
                    if let Some(oldest) = in_flight.pop_front() {
                        allocator.free(oldest);
                    }
                }
            }

            for record in in_flight {
                allocator.free(record);
            }
            done.store(true, Ordering::Release);
            (video_denials, audio_denials, dropped)
        })
    };

    let control = {
        let allocator = Arc::clone(&allocator);
        let stream = Arc::clone(&stream);
        let done = Arc::clone(&done);
        tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
            let mut changes = 0;
            while !done.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(rng.gen_range(1..5)));
                let next = rng.gen_range(0..STREAMS.len());
                stream.store(next, Ordering::Release);
                allocator.update_video_config(&STREAMS[next]);
                changes += 1;
            }
            changes
        })
    };

    let lifecycle = {
        let allocator = Arc::clone(&allocator);
        let done = Arc::clone(&done);
        tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(2));
            let mut suspends = 0;
            while !done.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(rng.gen_range(5..20)));
                allocator.suspend();
                suspends += 1;
                std::thread::sleep(Duration::from_millis(rng.gen_range(1..3)));
                allocator.resume();
            }
            suspends
        })
    };

    let (video_denials, audio_denials, dropped_frames) = decoder.await?;
    let stream_changes = control.await?;
    let suspends = lifecycle.await?;

    let report = Report {
        frames,
        video_denials,
        audio_denials,
        dropped_frames,
        stream_changes,
        suspends,
        elapsed_ms: started.elapsed().as_millis(),
        stats: allocator.stats(),
    };
    tracing::info!(
        allocated = allocator.allocated_memory(),
        capacity = allocator.current_memory_capacity(),
        "simulation finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("  Session:");
    println!("   Elapsed:           {} ms", report.elapsed_ms);
    println!("   Stream changes:    {}", report.stream_changes);
    println!("   Suspends:          {}", report.suspends);
    println!("   Video denials:     {}", report.video_denials);
    println!("   Audio denials:     {}", report.audio_denials);
    println!("   Dropped frames:    {}", report.dropped_frames);
    println!(
        "   Final capacity:    {:.2} MB (max {:.2} MB)",
        mb(allocator.current_memory_capacity()),
        mb(allocator.maximum_memory_capacity())
    );
    println!();
    print_stats(&report.stats, false)
}
