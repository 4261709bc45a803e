//! # Descriptors
//!
//! One descriptor per live allocation. Only the pool owns them.

use vram_core::BlockRange;

use crate::content::ContentDesc;
use crate::index::Fingerprint;
use crate::tracker::RefCount;

// =============================================================================
// DESCRIPTOR FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Descriptor state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u8 {
        /// Hardware memory is stale and must be rewritten on commit
        const DIRTY = 1 << 0;
        /// Compaction may relocate this descriptor
        const MOVABLE = 1 << 1;
        /// Moved by compaction since the last commit
        const RELOCATED = 1 << 2;
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// A live allocation
#[derive(Debug)]
pub struct Descriptor {
    /// Occupied blocks
    pub(crate) range: BlockRange,
    /// Logical content
    pub(crate) content: ContentDesc,
    /// Content index key, `None` when not shareable
    pub(crate) fingerprint: Option<Fingerprint>,
    /// External handles pointing here
    pub(crate) refs: RefCount,
    /// State flags
    pub(crate) flags: DescriptorFlags,
}

impl Descriptor {
    /// New dirty, movable descriptor with one reference
    pub(crate) fn new(range: BlockRange, content: ContentDesc) -> Self {
        Self {
            range,
            content,
            fingerprint: None,
            refs: RefCount::new(),
            flags: DescriptorFlags::DIRTY | DescriptorFlags::MOVABLE,
        }
    }

    /// Occupied blocks
    pub fn range(&self) -> BlockRange {
        self.range
    }

    /// Logical content
    pub fn content(&self) -> &ContentDesc {
        &self.content
    }

    /// Content index key
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Number of external handles
    pub fn ref_count(&self) -> u16 {
        self.refs.get()
    }

    /// Check if hardware memory is stale
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(DescriptorFlags::DIRTY)
    }

    /// Check if compaction may move it
    pub fn is_movable(&self) -> bool {
        self.flags.contains(DescriptorFlags::MOVABLE)
    }

    /// Check if moved since the last commit
    pub fn is_relocated(&self) -> bool {
        self.flags.contains(DescriptorFlags::RELOCATED)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.flags.insert(DescriptorFlags::DIRTY);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.flags
            .remove(DescriptorFlags::DIRTY | DescriptorFlags::RELOCATED);
    }

    pub(crate) fn set_movable(&mut self, movable: bool) {
        self.flags.set(DescriptorFlags::MOVABLE, movable);
    }

    /// Move to a new start block, which makes hardware memory stale
    pub(crate) fn relocate(&mut self, start: u16) {
        self.range.start = start;
        self.flags
            .insert(DescriptorFlags::DIRTY | DescriptorFlags::RELOCATED);
    }
}
