//! Bookkeeping for a running extraction.

use crate::options::{Options, SECTOR_SIZE};

use std::fmt;
use std::time::{Duration, Instant};

/// Why an extraction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The device reported that no more data follows.
    EndOfDevice,
    /// The image stopped growing for longer than the configured timeout.
    NoProgress,
    /// A long run of all-zero data was read without a credible total size.
    ZeroTail,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::EndOfDevice => "end of device",
            Termination::NoProgress => {
                "stopped: image did not grow during the no-progress window"
            }
            Termination::ZeroTail => {
                "stopped: long run of zeros without a reliable total, assuming end of disc"
            }
        })
    }
}

/// Mutable state of one extraction, owned by the loop.
#[derive(Debug, Clone)]
pub struct State {
    /// Bytes appended to the image so far.
    pub bytes_written: u64,

    /// Sectors replaced by zeros because no read size could recover them.
    pub zero_filled_sectors: u64,

    /// Reads that only succeeded after dropping below the largest size.
    pub rescues: u64,

    /// `bytes_written` at the last observed growth.
    pub last_progress_bytes: u64,

    /// When the image last grew.
    pub last_progress_at: Instant,

    /// Length of the current run of all-zero bytes at the end of the image.
    pub zero_tail_bytes: u64,

    /// Whether the run was cut by the no-progress timeout.
    pub stalled: bool,

    /// When the run started.
    pub started_at: Instant,

    /// Set once the loop has stopped on its own.
    pub termination: Option<Termination>,
}

impl State {
    /// Fresh state for a run starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            bytes_written: 0,
            zero_filled_sectors: 0,
            rescues: 0,
            last_progress_bytes: 0,
            last_progress_at: now,
            zero_tail_bytes: 0,
            stalled: false,
            started_at: now,
            termination: None,
        }
    }

    /// Account for `len` bytes appended to the image.
    pub fn record_write(&mut self, len: usize) {
        debug_assert_eq!(len % SECTOR_SIZE, 0);
        self.bytes_written += len as u64;
    }

    /// Track the trailing zero run with the block just written.
    pub fn record_tail(&mut self, block: &[u8]) {
        if block.iter().all(|&b| b == 0) {
            self.zero_tail_bytes += block.len() as u64;
        } else {
            self.zero_tail_bytes = 0;
        }
    }

    /// Update the no-progress timer.
    ///
    /// Returns true, and marks the state stalled, once the image has not
    /// grown for `no_progress_timeout` after at least
    /// `no_progress_armed_bytes` were written.
    pub fn check_progress(&mut self, now: Instant, options: &Options) -> bool {
        if self.bytes_written > self.last_progress_bytes {
            self.last_progress_bytes = self.bytes_written;
            self.last_progress_at = now;
            return false;
        }
        if self.bytes_written >= options.no_progress_armed_bytes
            && now.saturating_duration_since(self.last_progress_at) >= options.no_progress_timeout
        {
            self.stalled = true;
        }
        self.stalled
    }

    /// Whether the trailing zero run marks the end of an unsized disc.
    pub fn zero_tail_reached(&self, options: &Options) -> bool {
        self.bytes_written > options.zero_tail_armed_bytes
            && self.zero_tail_bytes >= options.zero_tail_bytes
    }

    /// Immutable view for progress reporting.
    pub fn snapshot(&self, total: Option<u64>, now: Instant) -> Snapshot {
        Snapshot {
            bytes_done: self.bytes_written,
            total,
            zero_filled_sectors: self.zero_filled_sectors,
            rescues: self.rescues,
            elapsed: now.saturating_duration_since(self.started_at),
            termination: self.termination,
        }
    }
}

/// Point-in-time copy of extraction progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub bytes_done: u64,
    /// Estimated total, `None` when no credible estimate exists.
    pub total: Option<u64>,
    pub zero_filled_sectors: u64,
    pub rescues: u64,
    pub elapsed: Duration,
    /// Present only on the final snapshot.
    pub termination: Option<Termination>,
}

impl Snapshot {
    /// Completed fraction in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .map(|total| (self.bytes_done as f64 / total as f64).min(1.0))
    }

    /// Average throughput in bytes per second.
    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes_done as f64 / self.elapsed.as_secs_f64().max(1e-6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Options {
        Options::new()
            .with_no_progress_timeout(Duration::from_secs(60))
            .with_no_progress_armed_bytes(4 * SECTOR_SIZE as u64)
            .with_zero_tail_bytes(2 * SECTOR_SIZE as u64)
            .with_zero_tail_armed_bytes(4 * SECTOR_SIZE as u64)
    }

    #[test]
    fn test_state_new() {
        let now = Instant::now();
        let state = State::new(now);
        assert_eq!(state.bytes_written, 0);
        assert_eq!(state.zero_filled_sectors, 0);
        assert_eq!(state.rescues, 0);
        assert_eq!(state.last_progress_at, now);
        assert!(!state.stalled);
        assert!(state.termination.is_none());
    }

    #[test]
    fn test_growth_resets_timer() {
        let opts = options();
        let t0 = Instant::now();
        let mut state = State::new(t0);
        state.record_write(8 * SECTOR_SIZE);

        let later = t0 + Duration::from_secs(600);
        assert!(!state.check_progress(later, &opts));
        assert_eq!(state.last_progress_bytes, 8 * SECTOR_SIZE as u64);
        assert_eq!(state.last_progress_at, later);

        // No growth, but not long enough.
        assert!(!state.check_progress(later + Duration::from_secs(59), &opts));
        assert!(state.check_progress(later + Duration::from_secs(60), &opts));
        assert!(state.stalled);
    }

    #[test]
    fn test_no_progress_needs_arming() {
        let opts = options();
        let t0 = Instant::now();
        let mut state = State::new(t0);
        state.record_write(2 * SECTOR_SIZE);
        assert!(!state.check_progress(t0, &opts));

        // Below the armed threshold, elapsed time never matters.
        assert!(!state.check_progress(t0 + Duration::from_secs(86_400), &opts));
        assert!(!state.stalled);
    }

    #[test]
    fn test_zero_tail_tracking() {
        let opts = options();
        let mut state = State::new(Instant::now());
        let zeros = vec![0u8; SECTOR_SIZE];
        let mut data = vec![0u8; SECTOR_SIZE];
        data[100] = 1;

        for block in [&data, &data, &data, &data, &zeros] {
            state.record_write(block.len());
            state.record_tail(block);
        }
        assert_eq!(state.zero_tail_bytes, SECTOR_SIZE as u64);
        assert!(!state.zero_tail_reached(&opts));

        state.record_write(zeros.len());
        state.record_tail(&zeros);
        assert!(state.zero_tail_reached(&opts));

        // Any non-zero block resets the run.
        state.record_write(data.len());
        state.record_tail(&data);
        assert_eq!(state.zero_tail_bytes, 0);
        assert!(!state.zero_tail_reached(&opts));
    }

    #[test]
    fn test_zero_tail_needs_arming() {
        let opts = options();
        let mut state = State::new(Instant::now());
        let zeros = vec![0u8; 4 * SECTOR_SIZE];
        state.record_write(zeros.len());
        state.record_tail(&zeros);

        // Exactly at the armed threshold is not past it.
        assert_eq!(state.bytes_written, opts.zero_tail_armed_bytes);
        assert!(!state.zero_tail_reached(&opts));
    }

    #[test]
    fn test_snapshot() {
        let t0 = Instant::now();
        let mut state = State::new(t0);
        state.record_write(4 * SECTOR_SIZE);
        state.zero_filled_sectors = 2;
        state.rescues = 1;

        let snap = state.snapshot(Some(16 * SECTOR_SIZE as u64), t0 + Duration::from_secs(2));
        assert_eq!(snap.bytes_done, 4 * SECTOR_SIZE as u64);
        assert_eq!(snap.zero_filled_sectors, 2);
        assert_eq!(snap.rescues, 1);
        assert_eq!(snap.elapsed, Duration::from_secs(2));
        assert_eq!(snap.fraction(), Some(0.25));
        assert_eq!(snap.bytes_per_sec(), 4096.0);
        assert!(snap.termination.is_none());

        let no_total = state.snapshot(None, t0);
        assert_eq!(no_total.fraction(), None);
    }
}
