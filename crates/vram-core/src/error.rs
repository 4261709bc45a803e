//! # Error Handling
//!
//! Error types for the VRAM block manager.
//!
//! Only conditions a caller can recover from are reported through [`Error`].
//! Handle misuse (a released handle, a zero-sized request) is a broken
//! caller contract and panics at the call site instead.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// VRAM Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Unified error type of the block manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Allocation Errors
    // =========================================================================
    /// No contiguous run of the requested size exists, even after compaction
    Exhausted(Exhaustion),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Pool configuration cannot describe a hardware region
    InvalidConfig,
    /// Global block manager used before `init`
    NotInitialized,
    /// Global block manager initialized twice
    AlreadyInitialized,
}

impl Error {
    /// Check if this is an allocation exhaustion
    #[inline]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted(e) => write!(f, "VRAM exhausted: {}", e),
            Self::InvalidConfig => write!(f, "invalid pool configuration"),
            Self::NotInitialized => write!(f, "block manager not initialized"),
            Self::AlreadyInitialized => write!(f, "block manager already initialized"),
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Why an allocation could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Fewer free blocks than requested in the whole pool
    Capacity {
        /// Requested blocks
        requested: u16,
        /// Free blocks in the pool
        available: u16,
    },
    /// Enough free blocks, but pinned descriptors split them into runs
    /// that are all too short
    Fragmented {
        /// Requested blocks
        requested: u16,
        /// Longest run reachable by compaction
        largest_run: u16,
    },
}

impl Exhaustion {
    /// Number of blocks the failed request asked for
    pub const fn requested(&self) -> u16 {
        match self {
            Self::Capacity { requested, .. } | Self::Fragmented { requested, .. } => *requested,
        }
    }
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity {
                requested,
                available,
            } => write!(
                f,
                "{} blocks requested, {} available",
                requested, available
            ),
            Self::Fragmented {
                requested,
                largest_run,
            } => write!(
                f,
                "{} blocks requested, largest reachable run is {}",
                requested, largest_run
            ),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<Exhaustion> for Error {
    fn from(e: Exhaustion) -> Self {
        Error::Exhausted(e)
    }
}
