//! # Content Index
//!
//! Maps content fingerprints to the descriptor holding that content.
//!
//! A fingerprint alone never proves equality: every hit is confirmed by
//! comparing shape and bytes against the stored descriptor, and a mismatch is
//! reported as a collision (treated by the allocator as a miss).

use core::fmt;

use hashbrown::HashMap;
use vram_core::BlockHandle;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::content::ContentDesc;
use crate::pool::BlockPool;

// =============================================================================
// FINGERPRINT
// =============================================================================

/// Hash of content bytes and shape parameters
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint of `content` stored in `block_count` blocks
    pub fn of(content: &ContentDesc, block_count: u16) -> Self {
        let seed = ((content.kind as u64) << 40)
            | ((content.bpp.bits() as u64) << 32)
            | block_count as u64;
        Self(xxh3_64_with_seed(content.bytes.as_bytes(), seed))
    }

    /// Build from a raw hash
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw hash
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

// =============================================================================
// LOOKUP RESULT
// =============================================================================

/// Outcome of a content lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Identical content found
    Hit(BlockHandle),
    /// Nothing registered under the fingerprint
    Miss,
    /// Fingerprint registered for different content
    Collision,
}

// =============================================================================
// CONTENT INDEX
// =============================================================================

/// Fingerprint to descriptor map, at most one descriptor per fingerprint
#[derive(Debug, Default)]
pub struct ContentIndex {
    entries: HashMap<Fingerprint, BlockHandle>,
}

impl ContentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registered fingerprints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor registered under a fingerprint, unverified
    pub fn get(&self, fingerprint: Fingerprint) -> Option<BlockHandle> {
        self.entries.get(&fingerprint).copied()
    }

    /// Find a descriptor holding exactly `content` in `block_count` blocks
    pub fn lookup(
        &self,
        fingerprint: Fingerprint,
        content: &ContentDesc,
        block_count: u16,
        pool: &BlockPool,
    ) -> Lookup {
        let Some(handle) = self.get(fingerprint) else {
            return Lookup::Miss;
        };

        let descriptor = pool.descriptor(handle);
        if descriptor.range.count == block_count && descriptor.content.same_content(content) {
            Lookup::Hit(handle)
        } else {
            Lookup::Collision
        }
    }

    /// Register a descriptor, returns false if the fingerprint is taken
    pub fn register(&mut self, fingerprint: Fingerprint, handle: BlockHandle) -> bool {
        match self.entries.entry(fingerprint) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Remove a fingerprint
    pub fn unregister(&mut self, fingerprint: Fingerprint) -> Option<BlockHandle> {
        self.entries.remove(&fingerprint)
    }

    /// Registered entries, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (Fingerprint, BlockHandle)> + '_ {
        self.entries.iter().map(|(&fp, &handle)| (fp, handle))
    }
}
