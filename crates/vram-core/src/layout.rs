//! # Hardware Layout
//!
//! Video memory geometry of the target handheld.
//!
//! ```text
//! 0x0600_0000 ┌───────────────────────────────┐
//!             │  Background VRAM (64 KiB)     │  32 blocks x 2 KiB
//!             │  character + screen blocks    │
//! 0x0601_0000 ├───────────────────────────────┤
//!             │  Sprite tile VRAM (32 KiB)    │  256 blocks x 128 B
//! 0x0601_8000 └───────────────────────────────┘
//! ```

use static_assertions::const_assert;

// =============================================================================
// TILES
// =============================================================================

/// Bytes per 8x8 tile at 4 bits per pixel
pub const TILE_SIZE_4BPP: usize = 32;

/// Bytes per 8x8 tile at 8 bits per pixel
pub const TILE_SIZE_8BPP: usize = 64;

/// Bytes per regular tile map cell
pub const MAP_CELL_SIZE: usize = 2;

// =============================================================================
// BACKGROUND VRAM
// =============================================================================

/// Background VRAM base address
pub const BG_VRAM_BASE: u32 = 0x0600_0000;

/// Background VRAM size in bytes
pub const BG_VRAM_SIZE: usize = 64 * 1024;

/// Background block size (one screen block)
pub const BG_BLOCK_SIZE: usize = 2 * 1024;

/// Background blocks in the pool
pub const BG_BLOCKS: u16 = (BG_VRAM_SIZE / BG_BLOCK_SIZE) as u16;

// =============================================================================
// SPRITE VRAM
// =============================================================================

/// Sprite tile VRAM base address
pub const OBJ_VRAM_BASE: u32 = 0x0601_0000;

/// Sprite tile VRAM size in bytes
pub const OBJ_VRAM_SIZE: usize = 32 * 1024;

/// Sprite block size (four 4bpp tiles)
pub const OBJ_BLOCK_SIZE: usize = 128;

/// Sprite blocks in the pool
pub const OBJ_BLOCKS: u16 = (OBJ_VRAM_SIZE / OBJ_BLOCK_SIZE) as u16;

// Blocks hold whole tiles of either depth
const_assert!(BG_BLOCK_SIZE % TILE_SIZE_8BPP == 0);
const_assert!(OBJ_BLOCK_SIZE % TILE_SIZE_8BPP == 0);
const_assert!(BG_VRAM_SIZE % BG_BLOCK_SIZE == 0);
const_assert!(OBJ_VRAM_SIZE % OBJ_BLOCK_SIZE == 0);
const_assert!(BG_VRAM_BASE as usize + BG_VRAM_SIZE == OBJ_VRAM_BASE as usize);

/// Number of whole blocks needed to hold `bytes`
#[inline]
pub const fn blocks_for(bytes: usize, block_size: usize) -> usize {
    bytes.div_ceil(block_size)
}
