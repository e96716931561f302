//! Configuration options for extraction runs.

use std::time::Duration;

use crate::error::{Error, Result};

/// Size of one logical block on optical media.
pub const SECTOR_SIZE: usize = 2048;

const MIB: u64 = 1024 * 1024;

/// Candidate read sizes, in sectors, tried from largest to smallest.
///
/// A ladder is strictly decreasing and always ends at exactly one sector so
/// that a single unreadable sector can be isolated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLadder {
    steps: Vec<usize>,
}

impl BlockLadder {
    /// Build a ladder from sector counts, largest first.
    pub fn new(steps: Vec<usize>) -> Result<Self> {
        if steps.last() != Some(&1) {
            return Err(Error::InvalidLadder(format!(
                "{:?} must end at exactly one sector",
                steps
            )));
        }
        if steps.windows(2).any(|w| w[0] <= w[1]) {
            return Err(Error::InvalidLadder(format!(
                "{:?} is not strictly decreasing",
                steps
            )));
        }
        Ok(Self { steps })
    }

    /// Sector counts, largest first.
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// The first and largest read size, in bytes.
    pub fn largest_bytes(&self) -> usize {
        self.steps[0] * SECTOR_SIZE
    }
}

impl Default for BlockLadder {
    /// 512 KiB, 64 KiB, 8 KiB, then a single sector.
    fn default() -> Self {
        Self {
            steps: vec![256, 32, 4, 1],
        }
    }
}

/// Options controlling the extraction loop.
#[derive(Debug, Clone)]
pub struct Options {
    /// Length of the trailing all-zero run that ends a run without a
    /// credible size estimate.
    pub zero_tail_bytes: u64,

    /// Bytes that must be written before the zero-tail check is armed.
    pub zero_tail_armed_bytes: u64,

    /// How long the image may stop growing before the run is cut.
    pub no_progress_timeout: Duration,

    /// Bytes that must be written before the no-progress check is armed.
    ///
    /// Slow drives spin up and seek for a long time at the start of a
    /// disc, so the check stays quiet until this much has been copied.
    pub no_progress_armed_bytes: u64,

    /// Attempts per block size before descending the ladder.
    pub retries: u32,

    /// Pause after a failed read attempt.
    pub retry_delay: Duration,

    /// Minimum time between two progress snapshots.
    pub progress_interval: Duration,

    /// Read sizes to try, largest first.
    pub ladder: BlockLadder,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            zero_tail_bytes: 512 * MIB,
            zero_tail_armed_bytes: 500 * MIB,
            no_progress_timeout: Duration::from_secs(5 * 60),
            no_progress_armed_bytes: 500 * MIB,
            retries: 3,
            retry_delay: Duration::from_millis(20),
            progress_interval: Duration::from_millis(100),
            ladder: BlockLadder::default(),
        }
    }
}

impl Options {
    /// Create a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailing zero-run length that ends an unsized run.
    pub fn with_zero_tail_bytes(mut self, bytes: u64) -> Self {
        self.zero_tail_bytes = bytes;
        self
    }

    /// Set how much must be written before the zero-tail check arms.
    pub fn with_zero_tail_armed_bytes(mut self, bytes: u64) -> Self {
        self.zero_tail_armed_bytes = bytes;
        self
    }

    /// Set the no-progress timeout.
    pub fn with_no_progress_timeout(mut self, timeout: Duration) -> Self {
        self.no_progress_timeout = timeout;
        self
    }

    /// Set how much must be written before the no-progress check arms.
    pub fn with_no_progress_armed_bytes(mut self, bytes: u64) -> Self {
        self.no_progress_armed_bytes = bytes;
        self
    }

    /// Set the number of attempts per block size.
    ///
    /// Zero is treated as one: every size is tried at least once.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set the pause after a failed read attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the minimum time between progress snapshots.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Replace the block size ladder.
    pub fn with_ladder(mut self, ladder: BlockLadder) -> Self {
        self.ladder = ladder;
        self
    }
}
