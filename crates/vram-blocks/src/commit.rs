//! # Commit Stage
//!
//! Batches every pending content write into one flush per frame.
//!
//! Dirty descriptors are visited in address order; runs of adjacent dirty
//! descriptors are coalesced into a single transfer. Outside the blanking
//! intervals, a descriptor whose blocks are being scanned out is skipped and
//! stays dirty for the next commit, so the display never reads a half
//! written region.

use alloc::vec;
use alloc::vec::Vec;

use vram_core::BlockRange;

use crate::pool::{BlockPool, PoolConfig};

// =============================================================================
// HARDWARE PORT
// =============================================================================

/// Display scan state at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Vertical blank: nothing is read
    VBlank,
    /// Horizontal blank between two lines
    HBlank,
    /// Active display, lines are being read
    Drawing,
}

impl ScanPhase {
    /// Check if the display is between reads
    #[inline]
    pub const fn is_blanking(self) -> bool {
        matches!(self, Self::VBlank | Self::HBlank)
    }
}

/// Destination of committed content
pub trait VramPort {
    /// Current scan phase
    fn phase(&self) -> ScanPhase;

    /// Check if active display output reads from `range`
    fn is_displaying(&self, range: BlockRange) -> bool;

    /// Copy `bytes` to `offset` bytes past the pool base
    fn write(&mut self, offset: usize, bytes: &[u8]);
}

// =============================================================================
// COMMIT REPORT
// =============================================================================

/// What a commit did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Descriptors written
    pub descriptors: usize,
    /// Port writes issued
    pub transfers: usize,
    /// Bytes copied
    pub bytes: usize,
    /// Dirty descriptors left for the next commit
    pub deferred: usize,
}

impl CommitReport {
    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.transfers == 0
    }
}

// =============================================================================
// COMMIT STAGE
// =============================================================================

/// End-of-frame flush of dirty descriptors
#[derive(Debug, Default)]
pub struct CommitStage {
    /// Reused between commits
    staging: Vec<u8>,
    /// Whether the last commit skipped anything
    deferred: bool,
    /// Commits performed
    commits: u64,
}

impl CommitStage {
    /// Create a new commit stage
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the last commit left dirty descriptors behind
    pub fn has_deferred_writes(&self) -> bool {
        self.deferred
    }

    /// Commits performed
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Write every dirty descriptor of `pool` to `port`
    pub fn commit<P: VramPort + ?Sized>(&mut self, pool: &mut BlockPool, port: &mut P) -> CommitReport {
        let mut report = CommitReport::default();
        let blanking = port.phase().is_blanking();
        let block_size = pool.config().block_size;
        let mut run: Option<BlockRange> = None;

        self.staging.clear();

        for position in 0..pool.order().len() {
            let slot = pool.order()[position];
            let descriptor = pool.live(slot);

            if !descriptor.is_dirty() {
                self.flush(&mut run, pool, port, &mut report);
                continue;
            }

            let range = descriptor.range;
            if !blanking && port.is_displaying(range) {
                report.deferred += 1;
                self.flush(&mut run, pool, port, &mut report);
                continue;
            }

            match run.as_mut() {
                Some(current) if current.end() == range.start => current.count += range.count,
                _ => {
                    self.flush(&mut run, pool, port, &mut report);
                    run = Some(range);
                }
            }

            let padded = self.staging.len() + range.count as usize * block_size;
            self.staging
                .extend_from_slice(descriptor.content.bytes.as_bytes());
            self.staging.resize(padded, 0);

            pool.live_mut(slot).mark_clean();
            report.descriptors += 1;
        }

        self.flush(&mut run, pool, port, &mut report);

        self.deferred = report.deferred > 0;
        self.commits += 1;

        if self.deferred {
            log::warn!(
                "{}: {} descriptor(s) deferred to next commit (display busy)",
                pool.config().name,
                report.deferred
            );
        }

        report
    }

    fn flush<P: VramPort + ?Sized>(
        &mut self,
        run: &mut Option<BlockRange>,
        pool: &BlockPool,
        port: &mut P,
        report: &mut CommitReport,
    ) {
        let Some(range) = run.take() else {
            return;
        };

        let offset = pool.byte_offset(range);
        log::trace!(
            "{}: commit {:?} ({} bytes at {})",
            pool.config().name,
            range,
            self.staging.len(),
            pool.address_of(range)
        );

        port.write(offset, &self.staging);
        report.transfers += 1;
        report.bytes += self.staging.len();
        self.staging.clear();
    }
}

// =============================================================================
// SHADOW VRAM
// =============================================================================

/// In-memory VRAM port
///
/// Backs host builds and emulation; counts every write it receives.
#[derive(Debug)]
pub struct ShadowVram {
    block_size: usize,
    bytes: Vec<u8>,
    phase: ScanPhase,
    displayed: Vec<BlockRange>,
    writes: usize,
    bytes_written: usize,
}

impl ShadowVram {
    /// Zeroed memory covering `config`'s region, in vertical blank
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            block_size: config.block_size,
            bytes: vec![0; config.size_bytes()],
            phase: ScanPhase::VBlank,
            displayed: Vec::new(),
            writes: 0,
            bytes_written: 0,
        }
    }

    /// Set the scan phase seen by the next commit
    pub fn set_phase(&mut self, phase: ScanPhase) {
        self.phase = phase;
    }

    /// Mark blocks as read by the display
    pub fn display(&mut self, range: BlockRange) {
        self.displayed.push(range);
    }

    /// Stop displaying everything
    pub fn clear_display(&mut self) {
        self.displayed.clear();
    }

    /// Writes received
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Bytes received
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Reset the write counters
    pub fn reset_counters(&mut self) {
        self.writes = 0;
        self.bytes_written = 0;
    }

    /// Memory backing a block range
    pub fn read(&self, range: BlockRange) -> &[u8] {
        let start = range.start as usize * self.block_size;
        &self.bytes[start..start + range.count as usize * self.block_size]
    }

    /// Whole region
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl VramPort for ShadowVram {
    fn phase(&self) -> ScanPhase {
        self.phase
    }

    fn is_displaying(&self, range: BlockRange) -> bool {
        self.displayed.iter().any(|shown| shown.overlaps(range))
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.writes += 1;
        self.bytes_written += bytes.len();
    }
}
