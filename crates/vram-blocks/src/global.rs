//! # Global Manager
//!
//! Process-wide block manager for code that cannot thread an allocator
//! through its call graph (interrupt handlers, frame hooks).

use spin::{Mutex, Once};
use vram_core::{Error, Result};

use crate::allocator::BlockAllocator;
use crate::pool::PoolConfig;

static BLOCKS: Once<Mutex<BlockAllocator>> = Once::new();

/// Create the global manager
pub fn init(config: PoolConfig) -> Result<()> {
    if BLOCKS.is_completed() {
        return Err(Error::AlreadyInitialized);
    }

    let allocator = BlockAllocator::new(config)?;
    let mut created = false;
    BLOCKS.call_once(|| {
        created = true;
        Mutex::new(allocator)
    });

    if !created {
        return Err(Error::AlreadyInitialized);
    }

    log::info!("global VRAM block manager ready");
    Ok(())
}

/// Check if [`init`] has run
pub fn is_initialized() -> bool {
    BLOCKS.is_completed()
}

/// Run `f` with exclusive access to the global manager
pub fn with<R>(f: impl FnOnce(&mut BlockAllocator) -> R) -> Result<R> {
    let blocks = BLOCKS.get().ok_or(Error::NotInitialized)?;
    Ok(f(&mut blocks.lock()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentDesc, Policy};
    use vram_core::BitDepth;

    static TILES: [u8; 64] = [3; 64];

    // Single test: the manager is shared by the whole test binary
    #[test]
    fn test_global_lifecycle() {
        assert!(!is_initialized());
        assert_eq!(with(|blocks| blocks.used_blocks_count()), Err(Error::NotInitialized));

        init(PoolConfig::obj_vram()).unwrap();
        assert!(is_initialized());
        assert_eq!(init(PoolConfig::bg_vram()), Err(Error::AlreadyInitialized));

        let handle = with(|blocks| {
            blocks.acquire(
                ContentDesc::tiles(&TILES[..], BitDepth::Bpp4),
                1,
                Policy::FindOrCreate,
            )
        })
        .unwrap()
        .unwrap();

        let (used, name) = with(|blocks| (blocks.used_blocks_count(), blocks.config().name)).unwrap();
        assert_eq!(used, 1);
        assert_eq!(name, "obj_blocks");

        with(|blocks| blocks.release(handle)).unwrap();
        assert_eq!(with(|blocks| blocks.used_blocks_count()), Ok(0));
    }
}
