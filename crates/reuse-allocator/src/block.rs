// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Address-range arithmetic for arena blocks.
//!
//! A [`MemoryBlock`] is a plain `(address, size)` pair. Blocks never own
//! memory; the arena regions they point into are owned by
//! [`ReuseAllocator`](crate::ReuseAllocator).

/// Smallest block the allocator will hand out or keep on the free list.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Smallest alignment the allocator will honour. Requests are raised to this.
pub const MIN_ALIGNMENT: usize = 16;

/// A contiguous range of arena addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBlock {
    address: usize,
    size: usize,
}

/// Which end of a free block a request is carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CarveFrom {
    Front,
    Back,
}

/// The outcome of carving a request out of a free block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Carved {
    /// The range that becomes live, including alignment padding.
    pub allocated: MemoryBlock,
    /// The aligned address handed to the caller.
    pub user_address: usize,
    /// What stays on the free list, if anything.
    pub remainder: Option<MemoryBlock>,
}

impl MemoryBlock {
    pub fn new(address: usize, size: usize) -> Self {
        Self { address, size }
    }

    /// Start address of the block.
    pub fn address(&self) -> usize {
        self.address
    }

    /// Length of the block in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last address of the block.
    pub fn end(&self) -> usize {
        self.address + self.size
    }

    /// Returns true if `request_size` bytes at `alignment` fit in this block.
    pub fn can_fulfill(&self, request_size: usize, alignment: usize) -> bool {
        let padding = align_up(self.address, alignment) - self.address;
        self.size >= request_size.saturating_add(padding)
    }

    /// Returns true if `other` starts where `self` ends or vice versa.
    pub fn is_adjacent(&self, other: &MemoryBlock) -> bool {
        self.end() == other.address || other.end() == self.address
    }

    /// Returns true if the two blocks share at least one byte.
    pub fn overlaps(&self, other: &MemoryBlock) -> bool {
        self.address < other.end() && other.address < self.end()
    }

    /// Carves `request_size` bytes out of this block.
    ///
    /// Carving from the front places the request at the lowest aligned
    /// address; carving from the back places it at the highest. If the
    /// leftover would be smaller than [`MIN_BLOCK_SIZE`], the whole block is
    /// handed out instead.
    ///
    /// The caller must have checked [`can_fulfill`](Self::can_fulfill).
    pub(crate) fn carve(&self, request_size: usize, alignment: usize, from: CarveFrom) -> Carved {
        debug_assert!(self.can_fulfill(request_size, alignment));

        let whole = Carved {
            allocated: *self,
            user_address: align_up(self.address, alignment),
            remainder: None,
        };

        match from {
            CarveFrom::Front => {
                let aligned = align_up(self.address, alignment);
                let end_of_allocation = aligned + request_size;
                let remaining = self.end() - end_of_allocation;
                if remaining < MIN_BLOCK_SIZE {
                    return whole;
                }
                Carved {
                    allocated: MemoryBlock::new(self.address, end_of_allocation - self.address),
                    user_address: aligned,
                    remainder: Some(MemoryBlock::new(end_of_allocation, remaining)),
                }
            }
            CarveFrom::Back => {
                let aligned = align_down(self.end() - request_size, alignment);
                let remaining = aligned - self.address;
                if remaining < MIN_BLOCK_SIZE {
                    return whole;
                }
                Carved {
                    allocated: MemoryBlock::new(aligned, self.end() - aligned),
                    user_address: aligned,
                    remainder: Some(MemoryBlock::new(self.address, remaining)),
                }
            }
        }
    }
}

/// Rounds `value` up to a multiple of the power-of-two `alignment`.
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds `value` down to a multiple of the power-of-two `alignment`.
pub(crate) fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Rounds `value` up to a multiple of `unit`, which need not be a power of two.
pub(crate) fn round_up(value: usize, unit: usize) -> Option<usize> {
    if unit <= 1 {
        return Some(value);
    }
    value.checked_add(unit - 1).map(|v| v / unit * unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_down(47, 16), 32);
        assert_eq!(round_up(10, 0), Some(10));
        assert_eq!(round_up(10, 3), Some(12));
        assert_eq!(round_up(4096, 4096), Some(4096));
        assert_eq!(round_up(usize::MAX, 16), None);
    }

    #[test]
    fn test_can_fulfill_accounts_for_padding() {
        let block = MemoryBlock::new(0x1010, 64);
        assert!(block.can_fulfill(64, 16));
        // Aligning to 64 skips 48 bytes, leaving 16.
        assert!(block.can_fulfill(16, 64));
        assert!(!block.can_fulfill(32, 64));
    }

    #[test]
    fn test_carve_front_splits() {
        let block = MemoryBlock::new(0x1000, 256);
        let carved = block.carve(64, 16, CarveFrom::Front);
        assert_eq!(carved.user_address, 0x1000);
        assert_eq!(carved.allocated, MemoryBlock::new(0x1000, 64));
        assert_eq!(carved.remainder, Some(MemoryBlock::new(0x1040, 192)));
    }

    #[test]
    fn test_carve_back_splits() {
        let block = MemoryBlock::new(0x1000, 256);
        let carved = block.carve(64, 16, CarveFrom::Back);
        assert_eq!(carved.user_address, 0x10c0);
        assert_eq!(carved.allocated, MemoryBlock::new(0x10c0, 64));
        assert_eq!(carved.remainder, Some(MemoryBlock::new(0x1000, 192)));
    }

    #[test]
    fn test_carve_back_with_alignment_keeps_tail_padding() {
        let block = MemoryBlock::new(0x1000, 0x200);
        let carved = block.carve(0x30, 0x100, CarveFrom::Back);
        assert_eq!(carved.user_address, 0x1100);
        assert_eq!(carved.allocated, MemoryBlock::new(0x1100, 0x100));
        assert_eq!(carved.remainder, Some(MemoryBlock::new(0x1000, 0x100)));
    }

    #[test]
    fn test_carve_takes_whole_block_when_remainder_tiny() {
        let block = MemoryBlock::new(0x1000, 72);
        let carved = block.carve(64, 16, CarveFrom::Front);
        assert_eq!(carved.allocated, block);
        assert!(carved.remainder.is_none());

        let carved = block.carve(64, 16, CarveFrom::Back);
        assert_eq!(carved.allocated, block);
        assert_eq!(carved.user_address, 0x1000);
        assert!(carved.remainder.is_none());
    }

    #[test]
    fn test_adjacency_and_overlap() {
        let a = MemoryBlock::new(0, 16);
        let b = MemoryBlock::new(16, 16);
        let c = MemoryBlock::new(8, 16);
        assert!(a.is_adjacent(&b));
        assert!(b.is_adjacent(&a));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(!a.is_adjacent(&c));
    }
}
