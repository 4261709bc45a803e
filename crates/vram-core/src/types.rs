//! # Core Types
//!
//! Fundamental type definitions shared by the block manager.
//!
//! These types provide:
//! - Strong typing for hardware addresses
//! - Block ranges expressed in block units, never bytes
//! - Opaque, generation-checked handles

use core::fmt;
use core::ops::{Add, Sub};

// =============================================================================
// VRAM ADDRESS
// =============================================================================

/// Hardware video-memory address
///
/// Valid only until the next compaction. Never cache it across frames.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VramAddr(u32);

impl VramAddr {
    /// Create a new VRAM address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u32) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u32) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl Add<u32> for VramAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<VramAddr> for VramAddr {
    type Output = u32;

    fn sub(self, rhs: VramAddr) -> Self::Output {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for VramAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VramAddr(0x{:08x})", self.0)
    }
}

impl fmt::Display for VramAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// =============================================================================
// BLOCK RANGE
// =============================================================================

/// Contiguous run of block units
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockRange {
    /// First block
    pub start: u16,
    /// Number of blocks
    pub count: u16,
}

impl BlockRange {
    /// Create a new range
    #[inline]
    pub const fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    /// One past the last block
    #[inline]
    pub const fn end(self) -> u16 {
        self.start + self.count
    }

    /// Check if empty
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.count == 0
    }

    /// Check if a block index falls inside the range
    #[inline]
    pub const fn contains(self, block: u16) -> bool {
        block >= self.start && block < self.end()
    }

    /// Check if two ranges share at least one block
    #[inline]
    pub const fn overlaps(self, other: BlockRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

impl fmt::Debug for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end())
    }
}

// =============================================================================
// BLOCK HANDLE
// =============================================================================

/// Opaque handle to a block allocation
///
/// Indexes the descriptor table; the generation detects use after release.
/// Handles stay valid across compaction, only the resolved address moves.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    slot: u16,
    generation: u16,
}

impl BlockHandle {
    /// Create a new handle
    #[inline]
    pub const fn new(slot: u16, generation: u16) -> Self {
        Self { slot, generation }
    }

    /// Descriptor table slot
    #[inline]
    pub const fn slot(self) -> u16 {
        self.slot
    }

    /// Slot generation this handle was issued for
    #[inline]
    pub const fn generation(self) -> u16 {
        self.generation
    }
}

impl fmt::Debug for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHandle({}#{})", self.slot, self.generation)
    }
}

// =============================================================================
// CONTENT SHAPE
// =============================================================================

/// What a block region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockKind {
    /// Tile graphics (character data)
    Tiles = 0,
    /// Tile map cells (screen entries)
    Map = 1,
}

/// Tile color depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BitDepth {
    /// 16 colors, 4 bits per pixel
    #[default]
    Bpp4 = 4,
    /// 256 colors, 8 bits per pixel
    Bpp8 = 8,
}

impl BitDepth {
    /// Bytes per 8x8 tile at this depth
    #[inline]
    pub const fn tile_size(self) -> usize {
        match self {
            Self::Bpp4 => crate::layout::TILE_SIZE_4BPP,
            Self::Bpp8 => crate::layout::TILE_SIZE_8BPP,
        }
    }

    /// Bits per pixel
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}
