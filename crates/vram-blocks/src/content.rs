//! # Content
//!
//! What callers ask the allocator to store, and how.

use alloc::vec::Vec;
use core::ops::Deref;

use vram_core::{BitDepth, BlockHandle, BlockKind};

// =============================================================================
// CONTENT BYTES
// =============================================================================

/// Logical bytes of a block region
///
/// Asset data usually lives in ROM and is borrowed for the program lifetime;
/// generated or edited content is owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBytes {
    /// Borrowed from read-only memory
    Static(&'static [u8]),
    /// Owned by the descriptor
    Owned(Vec<u8>),
}

impl ContentBytes {
    /// Get the bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Static(bytes) => *bytes,
            Self::Owned(bytes) => bytes.as_slice(),
        }
    }

    /// Take the bytes as an owned buffer, copying borrowed data
    pub fn into_owned(self) -> Vec<u8> {
        match self {
            Self::Static(bytes) => bytes.to_vec(),
            Self::Owned(bytes) => bytes,
        }
    }
}

impl Deref for ContentBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&'static [u8]> for ContentBytes {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Static(bytes)
    }
}

impl From<Vec<u8>> for ContentBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

// =============================================================================
// CONTENT DESCRIPTION
// =============================================================================

/// Content plus the shape parameters that take part in deduplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDesc {
    /// Tiles or map cells
    pub kind: BlockKind,
    /// Color depth of the tiles (also recorded for maps)
    pub bpp: BitDepth,
    /// Raw bytes
    pub bytes: ContentBytes,
}

impl ContentDesc {
    /// Tile graphics
    pub fn tiles(bytes: impl Into<ContentBytes>, bpp: BitDepth) -> Self {
        Self {
            kind: BlockKind::Tiles,
            bpp,
            bytes: bytes.into(),
        }
    }

    /// Tile map cells
    pub fn map(bytes: impl Into<ContentBytes>, bpp: BitDepth) -> Self {
        Self {
            kind: BlockKind::Map,
            bpp,
            bytes: bytes.into(),
        }
    }

    /// Same kind, depth and bytes
    pub fn same_content(&self, other: &ContentDesc) -> bool {
        self.kind == other.kind
            && self.bpp == other.bpp
            && self.bytes.as_bytes() == other.bytes.as_bytes()
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Source of an acquire request
#[derive(Debug, Clone)]
pub enum Content {
    /// Fresh content
    Data(ContentDesc),
    /// Content already held by a live allocation
    Shared(BlockHandle),
}

impl From<ContentDesc> for Content {
    fn from(desc: ContentDesc) -> Self {
        Self::Data(desc)
    }
}

impl From<BlockHandle> for Content {
    fn from(handle: BlockHandle) -> Self {
        Self::Shared(handle)
    }
}

/// Deduplication policy of an acquire request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Never share: always allocate a fresh descriptor
    AlwaysCreate,
    /// Reuse a descriptor holding identical content if one exists
    FindOrCreate,
}
