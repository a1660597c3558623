// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Decoder, playback-control and lifecycle threads sharing one allocator.

use decoder_buffer::{BudgetRule, BufferAllocator, BufferPoolConfig, ByteSize, VideoCodec, VideoConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const KB: usize = 1024;

fn shared(on_demand: bool, using_memory_pool: bool) -> Arc<dyn BufferAllocator> {
    let config = BufferPoolConfig {
        using_memory_pool,
        allocate_on_demand: on_demand,
        initial_capacity: ByteSize::from_kb(512),
        allocation_unit: ByteSize::from_kb(256),
        budgets: vec![
            BudgetRule::any_codec(1280, 720, 8, ByteSize::from_mb(2)),
            BudgetRule::any_codec(1920, 1080, 8, ByteSize::from_mb(4)),
        ],
        ..Default::default()
    };
    Arc::from(config.create_allocator().unwrap())
}

/// Runs a decoder that keeps a bounded ring of buffers in flight while the
/// other two threads change the stream and cycle suspend/resume.
fn run_playback(allocator: Arc<dyn BufferAllocator>, frames: usize) -> (usize, usize) {
    let done = Arc::new(AtomicBool::new(false));

    let decoder = {
        let allocator = Arc::clone(&allocator);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut in_flight = VecDeque::new();
            let (mut granted, mut denied) = (0, 0);
            for frame in 0..frames {
                let size = if frame % 4 == 0 { 2 * KB } else { 96 * KB + (frame % 7) * KB };
                let record = allocator.allocate(size, 64, frame);
                if record.is_empty() {
                    // Stall: release the oldest frame and move on.
                    denied += 1;
                    if let Some(oldest) = in_flight.pop_front() {
                        allocator.free(oldest);
                    }
                    continue;
                }
                granted += 1;
                in_flight.push_back(record);
                if in_flight.len() > 12 {
                    if let Some(oldest) = in_flight.pop_front() {
                        allocator.free(oldest);
                    }
                }
            }
            for record in in_flight {
                allocator.free(record);
            }
            done.store(true, Ordering::Release);
            (granted, denied)
        })
    };

    let control = {
        let allocator = Arc::clone(&allocator);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let streams = [
                VideoConfig::new(VideoCodec::H264, 1280, 720, 8),
                VideoConfig::new(VideoCodec::Vp9, 1920, 1080, 8),
            ];
            let mut i = 0;
            while !done.load(Ordering::Acquire) {
                allocator.update_video_config(&streams[i % streams.len()]);
                i += 1;
                thread::yield_now();
            }
        })
    };

    let lifecycle = {
        let allocator = Arc::clone(&allocator);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                allocator.suspend();
                thread::yield_now();
                allocator.resume();
                thread::yield_now();
            }
        })
    };

    let result = decoder.join().unwrap();
    control.join().unwrap();
    lifecycle.join().unwrap();
    result
}

#[test]
fn test_eager_pool_under_contention() {
    let allocator = shared(false, true);
    let (granted, _) = run_playback(Arc::clone(&allocator), 2000);
    assert!(granted > 0);
    assert_eq!(allocator.allocated_memory(), 0);

    let stats = allocator.stats();
    assert_eq!(stats.total_allocations, 2000);
    assert_eq!(stats.total_frees as usize, granted);
    assert!(stats.peak_allocated_bytes <= stats.peak_capacity_bytes);
}

#[test]
fn test_on_demand_pool_under_contention() {
    let allocator = shared(true, true);
    let (granted, _) = run_playback(Arc::clone(&allocator), 2000);
    assert!(granted > 0);
    assert_eq!(allocator.allocated_memory(), 0);
    assert_eq!(allocator.current_memory_capacity(), 0);
}

#[test]
fn test_direct_under_contention() {
    let allocator = shared(false, false);
    let (granted, denied) = run_playback(Arc::clone(&allocator), 2000);
    assert_eq!(granted, 2000);
    assert_eq!(denied, 0);
    assert_eq!(allocator.allocated_memory(), 0);
}
