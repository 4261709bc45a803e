//! # Reference Tracking
//!
//! Usage counting for shared descriptors, plus allocator-wide statistics.

// =============================================================================
// REFERENCE COUNT
// =============================================================================

/// Number of external handles pointing at a descriptor
///
/// Never observed at zero: the descriptor is removed from the pool in the
/// same call that drops the last reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefCount(u16);

impl RefCount {
    /// A freshly created descriptor has one owner
    pub const fn new() -> Self {
        Self(1)
    }

    /// Current count
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Add an owner
    #[track_caller]
    pub fn increase(&mut self) {
        self.0 = self
            .0
            .checked_add(1)
            .expect("descriptor reference count overflow");
    }

    /// Drop an owner, returns true when the last one is gone
    #[track_caller]
    pub fn decrease(&mut self) -> bool {
        assert!(self.0 > 0, "descriptor released more times than acquired");
        self.0 -= 1;
        self.0 == 0
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Allocator statistics
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    /// Descriptors created
    pub total_created: u64,
    /// Descriptors destroyed
    pub total_destroyed: u64,
    /// Acquires served by an existing descriptor
    pub dedup_hits: u64,
    /// Fingerprint matches rejected by the byte comparison
    pub hash_collisions: u64,
    /// Compaction passes
    pub compactions: u64,
    /// Descriptors moved by compaction
    pub relocations: u64,
    /// Acquires that failed with exhaustion
    pub exhaustions: u64,
    /// High water mark of used blocks
    pub peak_used_blocks: u16,
}

impl TrackerStats {
    /// Live descriptors
    pub fn active(&self) -> u64 {
        self.total_created - self.total_destroyed
    }
}
