// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Property tests: arena invariants under random allocate/free sequences.
//!
//! After every step the allocator must keep its free list ordered and
//! coalesced, never overlap live and free ranges, conserve bytes
//! (`allocated + free == capacity`), respect a non-zero ceiling and return
//! correctly aligned pointers.

use proptest::prelude::*;
use reuse_allocator::{BoundedAllocator, ReuseAllocator, ReuseConfig, SystemAllocator};
use std::ptr::NonNull;
use std::sync::Arc;

const KB: usize = 1024;

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: usize, align_shift: u32 },
    Free { index: usize },
    RaiseCeiling { bytes: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..64 * KB, 0u32..10).prop_map(|(size, align_shift)| Op::Allocate { size, align_shift }),
        3 => any::<usize>().prop_map(|index| Op::Free { index }),
        1 => (0usize..2048 * KB).prop_map(|bytes| Op::RaiseCeiling { bytes }),
    ]
}

fn check(pool: &ReuseAllocator, ceiling_before: usize) -> Result<(), TestCaseError> {
    if let Err(e) = pool.check_integrity() {
        return Err(TestCaseError::fail(e.to_string()));
    }
    prop_assert!(pool.allocated() <= pool.capacity());
    prop_assert_eq!(pool.allocated(), pool.capacity() - pool.free_bytes());
    prop_assert!(pool.max_capacity() >= ceiling_before);
    Ok(())
}

fn run(pool: &mut ReuseAllocator, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

    for op in ops {
        let ceiling_before = pool.max_capacity();
        match op {
            Op::Allocate { size, align_shift } => {
                let alignment = 1usize << align_shift;
                let capacity_before = pool.capacity();
                if let Some(ptr) = pool.allocate(size, alignment) {
                    prop_assert_eq!(ptr.as_ptr() as usize % alignment, 0);
                    live.push((ptr, size));
                }
                // Growth never crosses a ceiling that was in force.
                if pool.max_capacity() != 0 && pool.capacity() > capacity_before {
                    prop_assert!(pool.capacity() <= pool.max_capacity());
                }
            }
            Op::Free { index } => {
                if !live.is_empty() {
                    let (ptr, _) = live.swap_remove(index % live.len());
                    let capacity_before = pool.capacity();
                    pool.free(ptr);
                    prop_assert_eq!(pool.capacity(), capacity_before);
                }
            }
            Op::RaiseCeiling { bytes } => pool.increase_max_capacity_if_necessary(bytes),
        }
        check(pool, ceiling_before)?;
    }

    for (ptr, _) in live {
        pool.free(ptr);
    }
    prop_assert_eq!(pool.allocated(), 0);
    prop_assert!(pool.free_blocks().len() <= pool.region_count());
    check(pool, 0)?;
    Ok(())
}

proptest! {
    #[test]
    fn unbounded_arena_keeps_invariants(
        initial in 0usize..256 * KB,
        unit in prop_oneof![Just(0usize), Just(16 * KB), Just(64 * KB)],
        ops in proptest::collection::vec(op(), 1..120),
    ) {
        let config = ReuseConfig {
            initial_capacity: initial,
            allocation_unit: unit,
            ..Default::default()
        };
        let mut pool = ReuseAllocator::new(Arc::new(SystemAllocator), config).unwrap();
        run(&mut pool, ops)?;
    }

    #[test]
    fn bounded_arena_never_grows_past_ceiling(
        ceiling in 64 * KB..512 * KB,
        sizes in proptest::collection::vec(1usize..48 * KB, 1..60),
    ) {
        let config = ReuseConfig {
            initial_capacity: 32 * KB,
            allocation_unit: 32 * KB,
            max_capacity: ceiling,
            ..Default::default()
        };
        let mut pool = ReuseAllocator::new(Arc::new(SystemAllocator), config).unwrap();
        let mut live = Vec::new();
        for size in sizes {
            if let Some(ptr) = pool.allocate(size, 16) {
                live.push(ptr);
            }
            prop_assert!(pool.capacity() <= ceiling);
            prop_assert!(!pool.capacity_exceeded());
        }
        for ptr in live {
            pool.free(ptr);
        }
        prop_assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn round_trip_restores_allocated(
        warmup in proptest::collection::vec(1usize..8 * KB, 0..20),
        size in 0usize..32 * KB,
        align_shift in 0u32..12,
    ) {
        let config = ReuseConfig {
            initial_capacity: 256 * KB,
            ..Default::default()
        };
        let mut pool = ReuseAllocator::new(Arc::new(SystemAllocator), config).unwrap();
        let live: Vec<_> = warmup.into_iter().filter_map(|s| pool.allocate(s, 16)).collect();

        let allocated = pool.allocated();
        let capacity = pool.capacity();
        if let Some(ptr) = pool.allocate(size, 1 << align_shift) {
            let grown = pool.capacity();
            pool.free(ptr);
            prop_assert_eq!(pool.allocated(), allocated);
            prop_assert_eq!(pool.capacity(), grown);
            prop_assert!(grown >= capacity);
        }

        for ptr in live {
            pool.free(ptr);
        }
    }
}

#[test]
fn fallback_refusal_is_denial_not_panic() {
    let fallback = Arc::new(BoundedAllocator::new(128 * KB));
    let config = ReuseConfig {
        initial_capacity: 64 * KB,
        allocation_unit: 64 * KB,
        ..Default::default()
    };
    let mut pool = ReuseAllocator::new(fallback.clone(), config).unwrap();

    let a = pool.allocate(64 * KB, 16).unwrap();
    let b = pool.allocate(64 * KB, 16).unwrap();
    assert!(pool.allocate(KB, 16).is_none());
    assert_eq!(pool.capacity(), 128 * KB);

    pool.free(a);
    let c = pool.allocate(KB, 16).unwrap();
    pool.free(b);
    pool.free(c);
    pool.check_integrity().unwrap();

    drop(pool);
    assert_eq!(fallback.in_use(), 0);
}
