//! # VRAM Blocks
//!
//! Block manager for a fixed video-memory region.
//!
//! Callers ask for space by content; the manager hands out handles whose
//! hardware address may change on every acquire, shares identical content
//! between owners, and writes dirty content to hardware once per frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      BlockAllocator                          │
//! │  acquire / duplicate / release / resolve / update / commit   │
//! ├───────────────┬────────────────┬──────────────┬──────────────┤
//! │ ContentIndex  │   BlockPool    │ CommitStage  │ TrackerStats │
//! │ (fingerprint  │ (descriptors,  │ (dirty runs, │ (counters)   │
//! │  → handle)    │  free gaps)    │  VramPort)   │              │
//! └───────────────┴────────────────┴──────────────┴──────────────┘
//!                           │
//!                      vram-core
//! ```
//!
//! ## Example
//!
//! ```
//! use vram_blocks::{BitDepth, BlockAllocator, ContentDesc, Policy, PoolConfig, ShadowVram};
//!
//! static FONT: [u8; 256] = [0; 256];
//!
//! let config = PoolConfig::obj_vram();
//! let mut vram = ShadowVram::new(&config);
//! let mut blocks = BlockAllocator::new(config).unwrap();
//!
//! let font = ContentDesc::tiles(&FONT[..], BitDepth::Bpp4);
//! let a = blocks.acquire(font.clone(), 2, Policy::FindOrCreate).unwrap();
//! let b = blocks.acquire(font, 2, Policy::FindOrCreate).unwrap();
//! assert_eq!(blocks.resolve(a), blocks.resolve(b));
//!
//! blocks.commit(&mut vram);
//! blocks.release(a);
//! blocks.release(b);
//! assert_eq!(blocks.used_blocks_count(), 0);
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod allocator;
pub mod commit;
pub mod content;
pub mod descriptor;
pub mod global;
pub mod index;
pub mod pool;
pub mod tracker;

// Re-exports for convenience
pub use allocator::BlockAllocator;
pub use commit::{CommitReport, CommitStage, ScanPhase, ShadowVram, VramPort};
pub use content::{Content, ContentBytes, ContentDesc, Policy};
pub use descriptor::{Descriptor, DescriptorFlags};
pub use index::{ContentIndex, Fingerprint, Lookup};
pub use pool::{BlockPool, PoolConfig};
pub use tracker::{RefCount, TrackerStats};
pub use vram_core::{
    BitDepth, BlockHandle, BlockKind, BlockRange, Error, Exhaustion, Result, VramAddr,
};
