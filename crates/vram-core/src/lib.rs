//! # VRAM Core
//!
//! Foundational types, errors and hardware layout for the VRAM block manager.
//!
//! The display hardware exposes a small, fixed video-memory region that is
//! carved into equally sized blocks. Everything above this crate speaks in
//! block units; this crate defines what a block is, how block ranges map to
//! hardware addresses and which errors the manager can report.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        vram-core                            │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │   Types     │  │   Layout     │  │      Error         │  │
//! │  │ (VramAddr,  │  │ (block size, │  │    Handling        │  │
//! │  │  handles)   │  │  bases)      │  │                    │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

#[cfg(any(test, feature = "std"))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod layout;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Exhaustion, Result};
pub use types::*;
