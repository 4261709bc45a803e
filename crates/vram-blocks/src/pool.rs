//! # Block Pool
//!
//! Descriptor table and address-ordered layout of a fixed VRAM region.
//!
//! There is no free list: free space is whatever lies between consecutive
//! descriptors (and before the first / after the last one).
//!
//! ```text
//!  block  0    4       7          10
//!         ├────┼───────┼───────────┤
//!         │free│   B   │   free    │   order = [B]
//!         └────┴───────┴───────────┘
//! ```

use alloc::vec::Vec;

use vram_core::layout::{
    BG_BLOCKS, BG_BLOCK_SIZE, BG_VRAM_BASE, OBJ_BLOCKS, OBJ_BLOCK_SIZE, OBJ_VRAM_BASE,
    TILE_SIZE_4BPP,
};
use vram_core::{BlockHandle, BlockRange, Error, Result, VramAddr};

use crate::descriptor::Descriptor;

// =============================================================================
// POOL CONFIGURATION
// =============================================================================

/// Block pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name for diagnostics
    pub name: &'static str,
    /// Hardware address of block 0
    pub base: VramAddr,
    /// Bytes per block
    pub block_size: usize,
    /// Blocks in the pool
    pub total_blocks: u16,
}

impl PoolConfig {
    /// Custom pool
    pub const fn new(name: &'static str, base: u32, block_size: usize, total_blocks: u16) -> Self {
        Self {
            name,
            base: VramAddr::new(base),
            block_size,
            total_blocks,
        }
    }

    /// Background tiles and maps
    pub const fn bg_vram() -> Self {
        Self::new("bg_blocks", BG_VRAM_BASE, BG_BLOCK_SIZE, BG_BLOCKS)
    }

    /// Sprite tiles
    pub const fn obj_vram() -> Self {
        Self::new("obj_blocks", OBJ_VRAM_BASE, OBJ_BLOCK_SIZE, OBJ_BLOCKS)
    }

    /// Check that the configuration describes a usable region
    pub fn validate(&self) -> Result<()> {
        if self.total_blocks == 0
            || self.block_size == 0
            || self.block_size % TILE_SIZE_4BPP != 0
        {
            return Err(Error::InvalidConfig);
        }

        let end = (self.base.raw() as u64) + self.size_bytes() as u64;
        if end > u32::MAX as u64 + 1 {
            return Err(Error::InvalidConfig);
        }

        Ok(())
    }

    /// Region size in bytes
    pub const fn size_bytes(&self) -> usize {
        self.block_size * self.total_blocks as usize
    }

    /// 4bpp tiles per block
    pub const fn tiles_per_block(&self) -> usize {
        self.block_size / TILE_SIZE_4BPP
    }
}

// =============================================================================
// DESCRIPTOR SLOT
// =============================================================================

/// Descriptor table entry
#[derive(Debug)]
struct Slot {
    /// Bumped on every release so stale handles are detected
    generation: u16,
    descriptor: Option<Descriptor>,
}

// =============================================================================
// BLOCK POOL
// =============================================================================

/// Live descriptors of one VRAM region
#[derive(Debug)]
pub struct BlockPool {
    /// Configuration
    config: PoolConfig,
    /// Descriptor table, indexed by handle slot
    slots: Vec<Slot>,
    /// Unused table slots
    free_slots: Vec<u16>,
    /// Live slots sorted by start block
    order: Vec<u16>,
    /// Sum of live block counts
    used_blocks: u16,
}

impl BlockPool {
    /// Create an empty pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.total_blocks as usize),
            free_slots: Vec::new(),
            order: Vec::with_capacity(config.total_blocks as usize),
            used_blocks: 0,
            config,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Fixed hardware capacity
    pub fn total_blocks(&self) -> u16 {
        self.config.total_blocks
    }

    /// Blocks owned by descriptors
    pub fn used_blocks(&self) -> u16 {
        self.used_blocks
    }

    /// Blocks not owned by any descriptor
    pub fn available_blocks(&self) -> u16 {
        self.config.total_blocks - self.used_blocks
    }

    /// Live descriptors
    pub fn used_regions(&self) -> usize {
        self.order.len()
    }

    /// Maximal free gaps
    pub fn available_regions(&self) -> usize {
        self.free_runs().count()
    }

    /// Maximal free gaps in address order
    pub fn free_runs(&self) -> impl Iterator<Item = BlockRange> + '_ {
        let total = self.config.total_blocks;
        self.order
            .iter()
            .map(|&slot| self.live(slot).range)
            .map(|range| (range.start, range.end()))
            .chain(core::iter::once((total, total)))
            .scan(0u16, |cursor, (start, end)| {
                let gap = BlockRange::new(*cursor, start - *cursor);
                *cursor = end;
                Some(gap)
            })
            .filter(|gap| !gap.is_empty())
    }

    /// Longest free gap
    pub fn largest_free_run(&self) -> u16 {
        self.free_runs().map(|run| run.count).max().unwrap_or(0)
    }

    /// Start of the lowest free gap holding at least `min_size` blocks
    pub fn find_free_run(&self, min_size: u16) -> Option<u16> {
        self.free_runs()
            .find(|run| run.count >= min_size)
            .map(|run| run.start)
    }

    /// Hardware address of a block range
    pub fn address_of(&self, range: BlockRange) -> VramAddr {
        self.config.base + (range.start as usize * self.config.block_size) as u32
    }

    /// Byte offset of a block range from the pool base
    pub fn byte_offset(&self, range: BlockRange) -> usize {
        range.start as usize * self.config.block_size
    }

    // =========================================================================
    // Descriptor table
    // =========================================================================

    /// Add a descriptor over free blocks
    pub fn insert(&mut self, descriptor: Descriptor) -> BlockHandle {
        let range = descriptor.range;
        debug_assert!(range.end() <= self.config.total_blocks);

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize].descriptor = Some(descriptor);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    descriptor: Some(descriptor),
                });
                (self.slots.len() - 1) as u16
            }
        };

        let position = self
            .order
            .partition_point(|&other| self.live(other).range.start < range.start);
        self.order.insert(position, slot);
        self.used_blocks += range.count;

        BlockHandle::new(slot, self.slots[slot as usize].generation)
    }

    /// Remove a descriptor, its blocks become free
    #[track_caller]
    pub fn remove(&mut self, handle: BlockHandle) -> Descriptor {
        self.check_handle(handle);

        let slot = &mut self.slots[handle.slot() as usize];
        let descriptor = slot
            .descriptor
            .take()
            .expect("validated handle has a descriptor");
        slot.generation = slot.generation.wrapping_add(1);

        self.free_slots.push(handle.slot());
        self.order.retain(|&other| other != handle.slot());
        self.used_blocks -= descriptor.range.count;

        descriptor
    }

    /// Check if a handle refers to a live descriptor
    pub fn contains(&self, handle: BlockHandle) -> bool {
        self.slots
            .get(handle.slot() as usize)
            .is_some_and(|slot| slot.generation == handle.generation() && slot.descriptor.is_some())
    }

    /// Resolve a handle
    #[track_caller]
    pub fn descriptor(&self, handle: BlockHandle) -> &Descriptor {
        self.check_handle(handle);
        self.live(handle.slot())
    }

    /// Resolve a handle for mutation
    #[track_caller]
    pub fn descriptor_mut(&mut self, handle: BlockHandle) -> &mut Descriptor {
        self.check_handle(handle);
        self.live_mut(handle.slot())
    }

    /// Live descriptors in address order
    pub fn iter(&self) -> impl Iterator<Item = (BlockHandle, &Descriptor)> + '_ {
        self.order.iter().map(|&slot| {
            let entry = &self.slots[slot as usize];
            (
                BlockHandle::new(slot, entry.generation),
                self.live(slot),
            )
        })
    }

    /// Live slots in address order
    pub(crate) fn order(&self) -> &[u16] {
        &self.order
    }

    /// Descriptor of a live slot
    pub(crate) fn live(&self, slot: u16) -> &Descriptor {
        self.slots[slot as usize]
            .descriptor
            .as_ref()
            .expect("ordered slot is live")
    }

    /// Mutable descriptor of a live slot
    pub(crate) fn live_mut(&mut self, slot: u16) -> &mut Descriptor {
        self.slots[slot as usize]
            .descriptor
            .as_mut()
            .expect("ordered slot is live")
    }

    #[track_caller]
    fn check_handle(&self, handle: BlockHandle) {
        if !self.contains(handle) {
            panic!(
                "invalid block handle {:?} in pool `{}` (released or foreign)",
                handle, self.config.name
            );
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Assert every layout and accounting invariant
    pub fn check_invariants(&self) {
        let mut cursor = 0u16;
        let mut used = 0u16;
        for &slot in &self.order {
            let range = self.live(slot).range;
            assert!(
                range.start >= cursor,
                "descriptors overlap or are out of order at block {}",
                range.start
            );
            assert!(range.count > 0, "empty descriptor at block {}", range.start);
            cursor = range.end();
            used += range.count;
        }
        assert!(cursor <= self.config.total_blocks, "descriptor past pool end");
        assert_eq!(used, self.used_blocks, "used block accounting drifted");

        let free: u16 = self.free_runs().map(|run| run.count).sum();
        assert_eq!(used + free, self.config.total_blocks);

        let live = self.slots.iter().filter(|s| s.descriptor.is_some()).count();
        assert_eq!(live, self.order.len(), "descriptor table and order disagree");
    }
}
