//! # Block Allocator
//!
//! Find-or-create allocation over a [`BlockPool`].
//!
//! ## Allocation
//!
//! 1. With [`Policy::FindOrCreate`], identical content already in the pool is
//!    shared: its reference count goes up and its handle is returned.
//! 2. Otherwise the lowest free run large enough is used (first fit).
//! 3. If no run is large enough but enough blocks are free in total, the
//!    pool is compacted and the request placed in the coalesced space.
//! 4. If that is impossible the request fails with [`Error::Exhausted`].
//!
//! ## Compaction
//!
//! Pinned (non-movable) descriptors are walls that split the pool into
//! segments. Every segment is packed toward its low end, preserving the
//! order of its descriptors. In the first segment that can hold the request,
//! the request takes the place of the lowest free gap and the descriptors
//! after it are packed behind it:
//!
//! ```text
//!  before   │ free(4) │  B(3)  │ free(3) │      request C(5)
//!  after    │      C(5)     │  B(3)  │ free(2) │
//! ```
//!
//! When no segment can hold the request nothing is moved. Releasing never
//! compacts.

use alloc::vec::Vec;

use vram_core::layout::blocks_for;
use vram_core::{BlockHandle, BlockRange, Error, Exhaustion, Result, VramAddr};

use crate::commit::{CommitReport, CommitStage, VramPort};
use crate::content::{Content, ContentBytes, ContentDesc, Policy};
use crate::descriptor::Descriptor;
use crate::index::{ContentIndex, Fingerprint, Lookup};
use crate::pool::{BlockPool, PoolConfig};
use crate::tracker::TrackerStats;

// =============================================================================
// BLOCK ALLOCATOR
// =============================================================================

/// VRAM block manager
#[derive(Debug)]
pub struct BlockAllocator {
    /// Live descriptors
    pool: BlockPool,
    /// Shareable content
    index: ContentIndex,
    /// Pending hardware writes
    stage: CommitStage,
    /// Statistics
    stats: TrackerStats,
}

impl BlockAllocator {
    /// Create a manager for an empty region
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        log::debug!(
            "{}: {} blocks of {} bytes at {}",
            config.name,
            config.total_blocks,
            config.block_size,
            config.base
        );

        Ok(Self {
            pool: BlockPool::new(config),
            index: ContentIndex::new(),
            stage: CommitStage::new(),
            stats: TrackerStats::default(),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &PoolConfig {
        self.pool.config()
    }

    /// Read-only view of the pool
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Get statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    // =========================================================================
    // Acquire / release
    // =========================================================================

    /// Get a handle to `size` blocks holding `content`
    #[track_caller]
    pub fn acquire(
        &mut self,
        content: impl Into<Content>,
        size: u16,
        policy: Policy,
    ) -> Result<BlockHandle> {
        let content = match content.into() {
            Content::Data(desc) => desc,
            Content::Shared(handle) => {
                let source = self.pool.descriptor(handle);
                if policy == Policy::FindOrCreate {
                    assert_eq!(
                        source.range.count, size,
                        "shared content requested with a different size"
                    );
                    return Ok(self.duplicate(handle));
                }
                source.content.clone()
            }
        };

        self.check_request(&content, size);

        let fingerprint = match policy {
            Policy::AlwaysCreate => None,
            Policy::FindOrCreate => {
                let fingerprint = Fingerprint::of(&content, size);
                match self.index.lookup(fingerprint, &content, size, &self.pool) {
                    Lookup::Hit(handle) => {
                        self.pool.descriptor_mut(handle).refs.increase();
                        self.stats.dedup_hits += 1;
                        log::debug!(
                            "{}: shared {:?} (refs {})",
                            self.config().name,
                            handle,
                            self.pool.descriptor(handle).ref_count()
                        );
                        return Ok(handle);
                    }
                    Lookup::Miss => Some(fingerprint),
                    Lookup::Collision => {
                        self.stats.hash_collisions += 1;
                        log::debug!(
                            "{}: {:?} collides with different content",
                            self.config().name,
                            fingerprint
                        );
                        None
                    }
                }
            }
        };

        let start = self.reserve(size)?;

        let mut descriptor = Descriptor::new(BlockRange::new(start, size), content);
        descriptor.fingerprint = fingerprint;
        let handle = self.pool.insert(descriptor);
        if let Some(fingerprint) = fingerprint {
            self.index.register(fingerprint, handle);
        }

        self.stats.total_created += 1;
        self.stats.peak_used_blocks = self.stats.peak_used_blocks.max(self.pool.used_blocks());

        log::debug!(
            "{}: created {:?} at {:?} ({:?})",
            self.config().name,
            handle,
            BlockRange::new(start, size),
            policy
        );

        self.validate();
        Ok(handle)
    }

    /// Add an owner to an existing allocation
    #[track_caller]
    pub fn duplicate(&mut self, handle: BlockHandle) -> BlockHandle {
        let descriptor = self.pool.descriptor_mut(handle);
        descriptor.refs.increase();
        log::debug!(
            "{}: duplicated {:?} (refs {})",
            self.pool.config().name,
            handle,
            self.pool.descriptor(handle).ref_count()
        );
        handle
    }

    /// Drop an owner, freeing the blocks with the last one
    #[track_caller]
    pub fn release(&mut self, handle: BlockHandle) {
        if !self.pool.descriptor_mut(handle).refs.decrease() {
            return;
        }

        let descriptor = self.pool.remove(handle);
        if let Some(fingerprint) = descriptor.fingerprint {
            let removed = self.index.unregister(fingerprint);
            debug_assert_eq!(removed, Some(handle));
        }
        self.stats.total_destroyed += 1;

        log::debug!(
            "{}: freed {:?} at {:?}",
            self.config().name,
            handle,
            descriptor.range
        );

        self.validate();
    }

    // =========================================================================
    // Handle queries
    // =========================================================================

    /// Current hardware address, valid until the next acquire
    #[track_caller]
    pub fn resolve(&self, handle: BlockHandle) -> VramAddr {
        self.pool.address_of(self.pool.descriptor(handle).range)
    }

    /// Current block range
    #[track_caller]
    pub fn range(&self, handle: BlockHandle) -> BlockRange {
        self.pool.descriptor(handle).range
    }

    /// Logical content bytes
    #[track_caller]
    pub fn content(&self, handle: BlockHandle) -> &[u8] {
        self.pool.descriptor(handle).content.bytes.as_bytes()
    }

    /// Number of owners
    #[track_caller]
    pub fn ref_count(&self, handle: BlockHandle) -> u16 {
        self.pool.descriptor(handle).ref_count()
    }

    /// Check if a handle is still live
    pub fn contains(&self, handle: BlockHandle) -> bool {
        self.pool.contains(handle)
    }

    /// Check if hardware memory is stale
    #[track_caller]
    pub fn is_dirty(&self, handle: BlockHandle) -> bool {
        self.pool.descriptor(handle).is_dirty()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Force a rewrite on the next commit
    #[track_caller]
    pub fn mark_dirty(&mut self, handle: BlockHandle) {
        self.pool.descriptor_mut(handle).mark_dirty();
    }

    /// Pin (`false`) or unpin (`true`) an allocation for compaction
    #[track_caller]
    pub fn set_movable(&mut self, handle: BlockHandle, movable: bool) {
        self.pool.descriptor_mut(handle).set_movable(movable);
    }

    /// Replace the content of an allocation, for every owner
    #[track_caller]
    pub fn update(&mut self, handle: BlockHandle, bytes: impl Into<ContentBytes>) {
        let bytes = bytes.into();
        let descriptor = self.pool.descriptor(handle);
        self.check_fits(bytes.len(), descriptor.range.count);
        self.replace_content(handle, bytes);
    }

    /// Edit the content of an allocation in place, for every owner
    ///
    /// Borrowed content is copied into an owned buffer first.
    #[track_caller]
    pub fn modify(&mut self, handle: BlockHandle, f: impl FnOnce(&mut [u8])) {
        let descriptor = self.pool.descriptor_mut(handle);
        let bytes = core::mem::replace(&mut descriptor.content.bytes, ContentBytes::Static(&[]));
        let mut bytes = bytes.into_owned();
        f(&mut bytes);
        self.replace_content(handle, ContentBytes::Owned(bytes));
    }

    fn replace_content(&mut self, handle: BlockHandle, bytes: ContentBytes) {
        let descriptor = self.pool.descriptor_mut(handle);
        descriptor.content.bytes = bytes;
        descriptor.mark_dirty();

        let count = descriptor.range.count;
        let Some(previous) = descriptor.fingerprint.take() else {
            return;
        };

        self.index.unregister(previous);
        let descriptor = self.pool.descriptor_mut(handle);
        let fingerprint = Fingerprint::of(&descriptor.content, count);
        if self.index.register(fingerprint, handle) {
            descriptor.fingerprint = Some(fingerprint);
        } else {
            log::debug!(
                "{}: {:?} no longer shareable, content already present",
                self.pool.config().name,
                handle
            );
        }

        self.validate();
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Flush dirty allocations to hardware, once per frame
    pub fn commit<P: VramPort + ?Sized>(&mut self, port: &mut P) -> CommitReport {
        let report = self.stage.commit(&mut self.pool, port);
        self.validate();
        report
    }

    /// Check if the last commit left writes for the next one
    pub fn has_deferred_writes(&self) -> bool {
        self.stage.has_deferred_writes()
    }

    /// Check if any allocation is dirty
    pub fn has_pending_writes(&self) -> bool {
        self.pool.iter().any(|(_, descriptor)| descriptor.is_dirty())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Fixed capacity in blocks
    pub fn total_blocks_count(&self) -> usize {
        self.pool.total_blocks() as usize
    }

    /// Blocks owned by allocations
    pub fn used_blocks_count(&self) -> usize {
        self.pool.used_blocks() as usize
    }

    /// Free blocks
    pub fn available_blocks_count(&self) -> usize {
        self.pool.available_blocks() as usize
    }

    /// Live allocations
    pub fn used_regions_count(&self) -> usize {
        self.pool.used_regions()
    }

    /// Free gaps
    pub fn available_regions_count(&self) -> usize {
        self.pool.available_regions()
    }

    /// Longest free gap in blocks
    pub fn largest_free_run(&self) -> usize {
        self.pool.largest_free_run() as usize
    }

    /// Used space in 4bpp tiles
    pub fn used_tiles_count(&self) -> usize {
        self.used_blocks_count() * self.config().tiles_per_block()
    }

    /// Free space in 4bpp tiles
    pub fn available_tiles_count(&self) -> usize {
        self.available_blocks_count() * self.config().tiles_per_block()
    }

    /// Dump the descriptor table
    pub fn log_status(&self) {
        let config = self.config();
        log::info!(
            "{}: {}/{} blocks used ({} tiles free), {} regions used, {} free, largest free run {}",
            config.name,
            self.used_blocks_count(),
            self.total_blocks_count(),
            self.available_tiles_count(),
            self.used_regions_count(),
            self.available_regions_count(),
            self.largest_free_run()
        );

        for (handle, descriptor) in self.pool.iter() {
            log::info!(
                "  {:?} {:?} at {} refs={} {:?}{}{}{}",
                handle,
                descriptor.range,
                self.pool.address_of(descriptor.range),
                descriptor.ref_count(),
                descriptor.content.kind,
                if descriptor.fingerprint.is_some() { " shared" } else { "" },
                if descriptor.is_dirty() { " dirty" } else { "" },
                if descriptor.is_movable() { "" } else { " pinned" },
            );
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    #[track_caller]
    fn check_request(&self, content: &ContentDesc, size: u16) {
        assert!(
            size > 0 && size <= self.pool.total_blocks(),
            "request of {} blocks out of range for pool `{}` ({} blocks)",
            size,
            self.config().name,
            self.pool.total_blocks()
        );
        self.check_fits(content.bytes.len(), size);
    }

    #[track_caller]
    fn check_fits(&self, bytes: usize, blocks: u16) {
        assert!(
            blocks_for(bytes, self.config().block_size) <= blocks as usize,
            "{} bytes do not fit in {} blocks",
            bytes,
            blocks
        );
    }

    /// Start block of a free run of `size` blocks
    fn reserve(&mut self, size: u16) -> Result<u16> {
        let available = self.pool.available_blocks();
        if size > available {
            return Err(self.exhausted(Exhaustion::Capacity {
                requested: size,
                available,
            }));
        }

        if let Some(start) = self.pool.find_free_run(size) {
            return Ok(start);
        }

        self.compact_for(size)
    }

    /// Compact the pool around a pending request of `size` blocks
    fn compact_for(&mut self, size: u16) -> Result<u16> {
        let layout: Vec<(u16, BlockRange, bool)> = self
            .pool
            .order()
            .iter()
            .map(|&slot| {
                let descriptor = self.pool.live(slot);
                (slot, descriptor.range, descriptor.is_movable())
            })
            .collect();

        // Plan: first segment between walls with enough room
        let total = self.pool.total_blocks();
        let wall_at_end = (u16::MAX, BlockRange::new(total, 0), false);
        let mut segment = 0usize;
        let mut segment_start = 0u16;
        let mut movable_blocks = 0u16;
        let mut target = None;
        let mut largest_run = 0u16;

        for (_, range, movable) in layout.iter().copied().chain(core::iter::once(wall_at_end)) {
            if movable {
                movable_blocks += range.count;
                continue;
            }
            let room = range.start - segment_start - movable_blocks;
            largest_run = largest_run.max(room);
            if target.is_none() && room >= size {
                target = Some(segment);
            }
            segment += 1;
            segment_start = range.end();
            movable_blocks = 0;
        }

        let Some(target) = target else {
            return Err(self.exhausted(Exhaustion::Fragmented {
                requested: size,
                largest_run,
            }));
        };

        // Apply
        let mut cursor = 0u16;
        let mut segment = 0usize;
        let mut placed = None;
        let mut relocated = 0u64;

        for (slot, range, movable) in layout {
            if !movable {
                if segment == target && placed.is_none() {
                    placed = Some(cursor);
                }
                cursor = range.end();
                segment += 1;
                continue;
            }

            if segment == target && placed.is_none() && range.start > cursor {
                placed = Some(cursor);
                cursor += size;
            }

            if range.start != cursor {
                self.pool.live_mut(slot).relocate(cursor);
                relocated += 1;
            }
            cursor += range.count;
        }

        let start = placed.unwrap_or(cursor);

        self.stats.compactions += 1;
        self.stats.relocations += relocated;
        log::info!(
            "{}: compaction relocated {} descriptor(s) for a {}-block request at block {}",
            self.config().name,
            relocated,
            size,
            start
        );

        Ok(start)
    }

    fn exhausted(&mut self, exhaustion: Exhaustion) -> Error {
        self.stats.exhaustions += 1;
        log::warn!("{}: {}", self.config().name, exhaustion);
        Error::Exhausted(exhaustion)
    }

    #[inline]
    fn validate(&self) {
        if cfg!(any(test, feature = "validation")) {
            self.check_invariants();
        }
    }

    /// Assert pool and index consistency
    pub fn check_invariants(&self) {
        self.pool.check_invariants();

        for (fingerprint, handle) in self.index.iter() {
            assert!(self.pool.contains(handle), "index points at a freed descriptor");
            assert_eq!(
                self.pool.descriptor(handle).fingerprint,
                Some(fingerprint),
                "index and descriptor fingerprints disagree"
            );
        }
        let shareable = self
            .pool
            .iter()
            .filter(|(_, descriptor)| descriptor.fingerprint.is_some())
            .count();
        assert_eq!(shareable, self.index.len(), "unindexed shareable descriptor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{ScanPhase, ShadowVram};
    use alloc::vec;
    use vram_core::BitDepth;

    static A: [u8; 128] = [0xA1; 128];
    static B: [u8; 96] = [0xB2; 96];
    static C: [u8; 160] = [0xC3; 160];
    static D: [u8; 32] = [0xD4; 32];

    fn allocator(total: u16) -> BlockAllocator {
        BlockAllocator::new(PoolConfig::new("test", 0x0600_0000, 32, total)).unwrap()
    }

    fn tiles(bytes: &'static [u8]) -> ContentDesc {
        ContentDesc::tiles(bytes, BitDepth::Bpp4)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BlockAllocator::new(PoolConfig::new("bad", 0, 32, 0)).unwrap_err();
        assert_eq!(err, Error::InvalidConfig);
    }

    #[test]
    fn test_compaction_scenario() {
        let mut blocks = allocator(10);
        let a = blocks.acquire(tiles(&A), 4, Policy::AlwaysCreate).unwrap();
        let b = blocks.acquire(tiles(&B), 3, Policy::AlwaysCreate).unwrap();
        assert_eq!(blocks.range(a), BlockRange::new(0, 4));
        assert_eq!(blocks.range(b), BlockRange::new(4, 3));

        blocks.release(a);
        assert_eq!(blocks.available_regions_count(), 2);
        assert_eq!(blocks.largest_free_run(), 4);

        let c = blocks.acquire(tiles(&C), 5, Policy::AlwaysCreate).unwrap();
        assert_eq!(blocks.range(c), BlockRange::new(0, 5));
        assert_eq!(blocks.range(b), BlockRange::new(5, 3));
        assert_eq!(blocks.available_regions_count(), 1);
        assert_eq!(blocks.stats().compactions, 1);
        assert!(blocks.is_dirty(b));
    }

    #[test]
    fn test_find_or_create_shares_full_pool() {
        let mut blocks = allocator(5);
        let content = ContentDesc::tiles(&C[..], BitDepth::Bpp4);
        let first = blocks.acquire(content.clone(), 5, Policy::FindOrCreate).unwrap();
        let second = blocks.acquire(content, 5, Policy::FindOrCreate).unwrap();

        assert_eq!(first, second);
        assert_eq!(blocks.available_blocks_count(), 0);
        assert_eq!(blocks.ref_count(first), 2);
        assert_eq!(blocks.stats().dedup_hits, 1);
    }

    #[test]
    fn test_shared_release_order() {
        let mut blocks = allocator(8);
        let first = blocks.acquire(tiles(&B), 3, Policy::FindOrCreate).unwrap();
        // Owned copy of the same bytes still deduplicates
        let owned = ContentDesc::tiles(vec![0xB2; 96], BitDepth::Bpp4);
        let second = blocks.acquire(owned, 3, Policy::FindOrCreate).unwrap();
        assert_eq!(blocks.resolve(first), blocks.resolve(second));
        assert_eq!(blocks.ref_count(first), 2);

        blocks.release(first);
        assert!(blocks.contains(second));
        assert_eq!(blocks.content(second), &B[..]);
        assert_eq!(blocks.used_blocks_count(), 3);

        blocks.release(second);
        assert!(!blocks.contains(second));
        assert_eq!(blocks.used_blocks_count(), 0);
        assert_eq!(blocks.stats().active(), 0);
    }

    #[test]
    fn test_always_create_never_shares() {
        let mut blocks = allocator(8);
        let first = blocks.acquire(tiles(&B), 3, Policy::AlwaysCreate).unwrap();
        let second = blocks.acquire(tiles(&B), 3, Policy::AlwaysCreate).unwrap();

        assert_ne!(first, second);
        assert_ne!(blocks.resolve(first), blocks.resolve(second));
        assert_eq!(blocks.ref_count(first), 1);
        assert_eq!(blocks.ref_count(second), 1);

        // Neither is indexed, so a find-or-create needs a third copy
        let third = blocks.acquire(tiles(&B), 3, Policy::FindOrCreate);
        assert!(third.is_err());
        assert_eq!(blocks.used_blocks_count(), 6);
    }

    #[test]
    fn test_size_is_part_of_identity() {
        let mut blocks = allocator(8);
        let small = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();
        let large = blocks.acquire(tiles(&D), 2, Policy::FindOrCreate).unwrap();
        assert_ne!(small, large);
    }

    #[test]
    fn test_request_larger_than_available_fails_whole() {
        let mut blocks = allocator(10);
        blocks.acquire(tiles(&A), 4, Policy::AlwaysCreate).unwrap();
        blocks.acquire(tiles(&B), 3, Policy::AlwaysCreate).unwrap();

        let err = blocks.acquire(tiles(&A), 4, Policy::AlwaysCreate).unwrap_err();
        assert_eq!(
            err,
            Error::Exhausted(Exhaustion::Capacity {
                requested: 4,
                available: 3
            })
        );
        assert_eq!(blocks.used_blocks_count(), 7);
        assert_eq!(blocks.used_regions_count(), 2);
        assert_eq!(blocks.stats().exhaustions, 1);
        assert_eq!(blocks.stats().compactions, 0);
    }

    #[test]
    fn test_pinned_descriptor_is_a_wall() {
        let mut blocks = allocator(10);
        let a = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let wall = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let b = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let c = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        blocks.set_movable(wall, false);
        blocks.release(a);
        blocks.release(c);
        // free: [0..2) and [6..10); wall at [2..4), b at [4..6)

        let err = blocks.acquire(tiles(&D), 5, Policy::AlwaysCreate).unwrap_err();
        assert_eq!(
            err,
            Error::Exhausted(Exhaustion::Fragmented {
                requested: 5,
                largest_run: 4
            })
        );
        // Failing fast leaves the layout alone
        assert_eq!(blocks.range(b), BlockRange::new(4, 2));
        assert_eq!(blocks.stats().compactions, 0);

        // Unpinned, the same request succeeds
        blocks.set_movable(wall, true);
        let e = blocks.acquire(tiles(&D), 5, Policy::AlwaysCreate).unwrap();
        assert_eq!(blocks.range(e), BlockRange::new(0, 5));
        assert_eq!(blocks.range(wall), BlockRange::new(5, 2));
        assert_eq!(blocks.range(b), BlockRange::new(7, 2));
    }

    #[test]
    fn test_compaction_within_segment_after_wall() {
        let mut blocks = allocator(10);
        let wall = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let a = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let b = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let c = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        blocks.set_movable(wall, false);
        blocks.release(a);
        blocks.release(c);
        // wall [0..2), free [2..4), b [4..6), free [6..10)

        let d = blocks.acquire(tiles(&D), 5, Policy::AlwaysCreate).unwrap();
        assert_eq!(blocks.range(wall), BlockRange::new(0, 2));
        assert_eq!(blocks.range(d), BlockRange::new(2, 5));
        assert_eq!(blocks.range(b), BlockRange::new(7, 2));
        assert_eq!(blocks.stats().relocations, 1);
    }

    #[test]
    fn test_compaction_preserves_content_and_order() {
        let config = PoolConfig::new("test", 0x0600_0000, 32, 12);
        let mut vram = ShadowVram::new(&config);
        let mut blocks = BlockAllocator::new(config).unwrap();

        let h1 = blocks.acquire(tiles(&D), 1, Policy::AlwaysCreate).unwrap();
        let h2 = blocks.acquire(tiles(&A), 4, Policy::AlwaysCreate).unwrap();
        let h3 = blocks.acquire(tiles(&D), 2, Policy::AlwaysCreate).unwrap();
        let h4 = blocks.acquire(tiles(&B), 3, Policy::AlwaysCreate).unwrap();
        blocks.release(h1);
        blocks.release(h3);
        blocks.commit(&mut vram);

        let live = [h2, h4];
        let before: Vec<Vec<u8>> = live.iter().map(|&h| blocks.content(h).to_vec()).collect();
        let regions_before = blocks.available_regions_count();

        // Free: 1 + 2 + 2 blocks, no run of 4
        let h5 = blocks.acquire(tiles(&C), 5, Policy::AlwaysCreate).unwrap();
        assert_eq!(blocks.stats().compactions, 1);
        assert!(blocks.available_regions_count() <= regions_before);

        // Relative order kept
        assert!(blocks.range(h2).start < blocks.range(h4).start);

        // Logical content unchanged, hardware catches up on commit
        assert!(blocks.has_pending_writes());
        blocks.commit(&mut vram);
        for (handle, expected) in live.iter().zip(&before) {
            assert_eq!(blocks.content(*handle), &expected[..]);
            let range = blocks.range(*handle);
            assert_eq!(&vram.read(range)[..expected.len()], &expected[..]);
        }
        assert_eq!(&vram.read(blocks.range(h5))[..C.len()], &C[..]);
        assert!(!blocks.has_pending_writes());
    }

    #[test]
    fn test_commit_with_nothing_dirty_is_silent() {
        let config = PoolConfig::new("test", 0, 32, 4);
        let mut vram = ShadowVram::new(&config);
        let mut blocks = BlockAllocator::new(config).unwrap();

        assert!(blocks.commit(&mut vram).is_empty());
        blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();
        assert_eq!(blocks.commit(&mut vram).transfers, 1);

        vram.reset_counters();
        blocks.commit(&mut vram);
        assert_eq!(vram.writes(), 0);
    }

    #[test]
    fn test_deferred_commit_is_exposed() {
        let config = PoolConfig::new("test", 0, 32, 4);
        let mut vram = ShadowVram::new(&config);
        let mut blocks = BlockAllocator::new(config).unwrap();
        let handle = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();

        vram.set_phase(ScanPhase::Drawing);
        vram.display(blocks.range(handle));
        let report = blocks.commit(&mut vram);
        assert_eq!(report.deferred, 1);
        assert!(blocks.has_deferred_writes());
        assert!(blocks.is_dirty(handle));
    }

    #[test]
    fn test_shared_content_source() {
        let mut blocks = allocator(8);
        let original = blocks.acquire(tiles(&B), 3, Policy::FindOrCreate).unwrap();

        let shared = blocks
            .acquire(Content::Shared(original), 3, Policy::FindOrCreate)
            .unwrap();
        assert_eq!(shared, original);
        assert_eq!(blocks.ref_count(original), 2);

        let copy = blocks
            .acquire(Content::Shared(original), 3, Policy::AlwaysCreate)
            .unwrap();
        assert_ne!(copy, original);
        assert_eq!(blocks.content(copy), blocks.content(original));
        assert_eq!(blocks.ref_count(copy), 1);
    }

    #[test]
    fn test_update_rekeys_content() {
        let mut blocks = allocator(8);
        let handle = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();
        let mut vram = ShadowVram::new(blocks.config());
        blocks.commit(&mut vram);
        assert!(!blocks.is_dirty(handle));

        static E: [u8; 32] = [0xE5; 32];
        blocks.update(handle, &E[..]);
        assert!(blocks.is_dirty(handle));
        assert_eq!(blocks.content(handle), &E[..]);

        // Old content is no longer found, new content is
        let old = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();
        assert_ne!(old, handle);
        let new = blocks.acquire(tiles(&E), 1, Policy::FindOrCreate).unwrap();
        assert_eq!(new, handle);
    }

    #[test]
    fn test_update_to_existing_content_stops_sharing() {
        let mut blocks = allocator(8);
        let first = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();
        let second = blocks.acquire(tiles(&B), 3, Policy::FindOrCreate).unwrap();
        blocks.update(second, &D[..]);

        // Sizes differ, so both stay indexed under distinct fingerprints
        assert_eq!(blocks.acquire(tiles(&D), 3, Policy::FindOrCreate).unwrap(), second);

        static G: [u8; 32] = [0x77; 32];
        let third = blocks.acquire(tiles(&G), 1, Policy::FindOrCreate).unwrap();
        blocks.update(third, &D[..]);
        // Same shape as `first` now: `first` keeps the index entry
        assert_eq!(blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap(), first);
        assert_eq!(blocks.ref_count(third), 1);
    }

    #[test]
    fn test_modify_copies_static_content() {
        let mut blocks = allocator(4);
        let handle = blocks.acquire(tiles(&D), 1, Policy::AlwaysCreate).unwrap();
        blocks.modify(handle, |bytes| bytes[0] = 0);
        assert_eq!(blocks.content(handle)[0], 0);
        assert_eq!(blocks.content(handle)[1], 0xD4);
        assert_eq!(D[0], 0xD4);
        assert!(blocks.is_dirty(handle));
    }

    #[test]
    fn test_hash_collision_falls_back_to_fresh_allocation() {
        let mut blocks = allocator(8);
        let holder = blocks.acquire(tiles(&D), 1, Policy::FindOrCreate).unwrap();

        // Re-key the holder under the fingerprint another content would use
        static F: [u8; 32] = [0xF6; 32];
        let other = tiles(&F);
        let forged = Fingerprint::of(&other, 1);
        let real = blocks.pool.descriptor(holder).fingerprint.unwrap();
        blocks.index.unregister(real);
        blocks.index.register(forged, holder);
        blocks.pool.descriptor_mut(holder).fingerprint = Some(forged);

        let fresh = blocks.acquire(other, 1, Policy::FindOrCreate).unwrap();
        assert_ne!(fresh, holder);
        assert_eq!(blocks.content(fresh), &F[..]);
        assert_eq!(blocks.stats().hash_collisions, 1);
        assert_eq!(blocks.ref_count(holder), 1);
    }

    #[test]
    fn test_tile_counts() {
        let mut blocks = BlockAllocator::new(PoolConfig::bg_vram()).unwrap();
        assert_eq!(blocks.available_tiles_count(), 32 * 64);
        blocks.acquire(tiles(&C), 1, Policy::FindOrCreate).unwrap();
        assert_eq!(blocks.used_tiles_count(), 64);
        assert_eq!(blocks.available_tiles_count(), 31 * 64);
        blocks.log_status();
    }

    #[test]
    #[should_panic(expected = "invalid block handle")]
    fn test_double_release_panics() {
        let mut blocks = allocator(4);
        let handle = blocks.acquire(tiles(&D), 1, Policy::AlwaysCreate).unwrap();
        blocks.release(handle);
        blocks.release(handle);
    }

    #[test]
    #[should_panic(expected = "invalid block handle")]
    fn test_mark_dirty_after_release_panics() {
        let mut blocks = allocator(4);
        let handle = blocks.acquire(tiles(&D), 1, Policy::AlwaysCreate).unwrap();
        blocks.release(handle);
        blocks.mark_dirty(handle);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_zero_sized_request_panics() {
        let mut blocks = allocator(4);
        let _ = blocks.acquire(tiles(&D), 0, Policy::AlwaysCreate);
    }

    #[test]
    #[should_panic(expected = "do not fit")]
    fn test_oversized_content_panics() {
        let mut blocks = allocator(4);
        let _ = blocks.acquire(tiles(&B), 1, Policy::AlwaysCreate);
    }

    #[test]
    fn test_random_sequences_keep_accounting() {
        static PATTERNS: [[u8; 32]; 4] = [[1; 32], [2; 32], [3; 32], [4; 32]];

        let config = PoolConfig::new("test", 0, 32, 24);
        let mut vram = ShadowVram::new(&config);
        let mut blocks = BlockAllocator::new(config).unwrap();
        let mut live: Vec<BlockHandle> = Vec::new();
        let mut state = 0x2545_F491_4F6C_DD1Du64;

        for step in 0..2000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let r = state;

            if live.is_empty() || r % 3 != 0 {
                let pattern = &PATTERNS[(r >> 8) as usize % PATTERNS.len()];
                let size = 1 + ((r >> 16) % 5) as u16;
                let policy = if (r >> 24) & 1 == 0 {
                    Policy::FindOrCreate
                } else {
                    Policy::AlwaysCreate
                };
                let available = blocks.available_blocks_count();
                match blocks.acquire(tiles(&pattern[..]), size, policy) {
                    Ok(handle) => live.push(handle),
                    Err(Error::Exhausted(Exhaustion::Capacity { requested, .. })) => {
                        assert!(requested as usize > available);
                    }
                    Err(e) => panic!("unexpected error at step {}: {}", step, e),
                }
            } else {
                let victim = live.swap_remove((r >> 8) as usize % live.len());
                blocks.release(victim);
            }

            assert_eq!(
                blocks.used_blocks_count() + blocks.available_blocks_count(),
                blocks.total_blocks_count()
            );

            if step % 50 == 0 {
                blocks.commit(&mut vram);
                for &handle in &live {
                    let content = blocks.content(handle);
                    assert_eq!(&vram.read(blocks.range(handle))[..content.len()], content);
                }
            }
        }
    }
}
