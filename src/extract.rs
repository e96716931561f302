//! The adaptive read/write loop.
//!
//! Each iteration reads the next block from the device, descending the
//! block size ladder when reads fail and substituting a zeroed sector when
//! nothing can be read at all, then appends the result to the image and
//! syncs it. Without a credible total size, two heuristics decide when the
//! disc has ended: a long trailing run of zeros, or the image not growing
//! for a configured time.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::estimate::SizeEstimate;
use crate::options::{Options, SECTOR_SIZE};
use crate::progress::ProgressSink;
use crate::state::{State, Termination};

use std::fs::File;
use std::io::{self, Write};
use std::thread;
use std::time::Instant;

/// A failed read attempt, split by whether retrying can help.
#[derive(Debug)]
enum ReadFault {
    /// Media or transport error; retried, then descended past.
    Retryable(io::Error),
    /// Another process holds the drive or we lack privileges.
    Fatal(io::Error),
}

impl From<io::Error> for ReadFault {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::PermissionDenied {
            ReadFault::Fatal(e)
        } else {
            ReadFault::Retryable(e)
        }
    }
}

/// Copy the disc in `device` into `destination`.
///
/// Runs until the device reports its end, or one of the termination
/// heuristics fires, and returns the final state with its termination
/// cause. Only permission failures on the device and failures writing the
/// image are returned as errors; the sink still gets a last snapshot with
/// the counters reached before the failure.
pub fn run<D: Device + ?Sized>(
    device: &mut D,
    destination: &mut File,
    estimate: Option<&SizeEstimate>,
    options: &Options,
    sink: &mut dyn ProgressSink,
) -> Result<State> {
    let total = estimate.map(SizeEstimate::total);
    match estimate {
        Some(e) => log::info!("imaging {} bytes (size from {})", e.total(), e.method()),
        None => log::info!("no credible total size, relying on end-of-disc heuristics"),
    }

    let mut ctx = Extraction::new(device, destination, total, options);
    let mut last_report: Option<Instant> = None;

    loop {
        let stop = match ctx.step() {
            Ok(stop) => stop,
            Err(e) => {
                sink.on_progress(&ctx.state.snapshot(total, Instant::now()));
                return Err(e);
            }
        };
        let now = Instant::now();

        if let Some(termination) = stop {
            ctx.state.termination = Some(termination);
            sink.on_progress(&ctx.state.snapshot(total, now));
            log::info!(
                "{} after {} bytes ({} zero-filled sectors, {} rescues)",
                termination,
                ctx.state.bytes_written,
                ctx.state.zero_filled_sectors,
                ctx.state.rescues
            );
            return Ok(ctx.state);
        }

        let due = last_report.map_or(true, |at| {
            now.saturating_duration_since(at) >= options.progress_interval
        });
        if due {
            sink.on_progress(&ctx.state.snapshot(total, now));
            last_report = Some(now);
        }
    }
}

/// Everything one extraction run works on.
struct Extraction<'a, D: ?Sized> {
    device: &'a mut D,
    destination: &'a mut File,
    total: Option<u64>,
    options: &'a Options,
    /// Scratch buffer sized for the largest ladder step.
    buf: Vec<u8>,
    /// Device offset of the next read.
    offset: u64,
    state: State,
}

impl<'a, D: Device + ?Sized> Extraction<'a, D> {
    fn new(
        device: &'a mut D,
        destination: &'a mut File,
        total: Option<u64>,
        options: &'a Options,
    ) -> Self {
        Self {
            device,
            destination,
            total,
            options,
            buf: vec![0u8; options.ladder.largest_bytes()],
            offset: 0,
            state: State::new(Instant::now()),
        }
    }

    /// One read/write cycle. Returns the termination cause once the run
    /// should stop.
    fn step(&mut self) -> Result<Option<Termination>> {
        if let Some(total) = self.total {
            if self.state.bytes_written >= total {
                if self.at_end()? {
                    return Ok(Some(Termination::EndOfDevice));
                }
                log::debug!("device continues past the estimated {} bytes", total);
            }
        }

        let len = match self.read_block()? {
            Some(0) => return Ok(Some(Termination::EndOfDevice)),
            // Only whole sectors are kept; the rest is read again.
            Some(n) => n - n % SECTOR_SIZE,
            None => {
                log::warn!(
                    "sector {} unreadable at every block size, filling with zeros",
                    self.offset / SECTOR_SIZE as u64
                );
                self.buf[..SECTOR_SIZE].fill(0);
                self.state.zero_filled_sectors += 1;
                SECTOR_SIZE
            }
        };

        if len > 0 {
            self.append(len)?;
        } else {
            log::debug!("short read at offset {}", self.offset);
            thread::sleep(self.options.retry_delay);
        }

        if self.state.check_progress(Instant::now(), self.options) {
            return Ok(Some(Termination::NoProgress));
        }
        if self.total.is_none() && self.state.zero_tail_reached(self.options) {
            return Ok(Some(Termination::ZeroTail));
        }
        Ok(None)
    }

    /// Whether the device is exhausted at the current offset.
    ///
    /// Past the estimated total an unreadable sector counts as the end too,
    /// otherwise a damaged lead-out would be zero-filled forever.
    fn at_end(&mut self) -> Result<bool> {
        let mut sector = [0u8; SECTOR_SIZE];
        match self.device.read_at(&mut sector, self.offset).map_err(ReadFault::from) {
            Ok(n) => Ok(n == 0),
            Err(ReadFault::Fatal(source)) => Err(Error::PermissionDenied { source }),
            Err(ReadFault::Retryable(e)) => {
                log::debug!("end check at offset {} failed: {}", self.offset, e);
                Ok(true)
            }
        }
    }

    /// Read into `buf` descending the ladder.
    ///
    /// Returns the byte count of the first size that succeeded, or `None`
    /// if every size failed on every attempt.
    fn read_block(&mut self) -> Result<Option<usize>> {
        let options = self.options;
        let attempts = options.retries.max(1);

        for (step, &sectors) in options.ladder.steps().iter().enumerate() {
            let size = sectors * SECTOR_SIZE;
            for attempt in 1..=attempts {
                match self
                    .device
                    .read_at(&mut self.buf[..size], self.offset)
                    .map_err(ReadFault::from)
                {
                    Ok(n) => {
                        if step > 0 {
                            self.state.rescues += 1;
                        }
                        return Ok(Some(n));
                    }
                    Err(ReadFault::Fatal(source)) => {
                        return Err(Error::PermissionDenied { source });
                    }
                    Err(ReadFault::Retryable(e)) => {
                        log::debug!(
                            "read of {} sectors at offset {} failed (attempt {}/{}): {}",
                            sectors,
                            self.offset,
                            attempt,
                            attempts,
                            e
                        );
                        thread::sleep(options.retry_delay);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Append the first `len` bytes of `buf` to the image and make them
    /// durable before counting them.
    fn append(&mut self, len: usize) -> Result<()> {
        let block = &self.buf[..len];
        self.destination
            .write_all(block)
            .and_then(|()| self.destination.sync_data())
            .map_err(|source| Error::Write { source })?;

        self.offset += len as u64;
        self.state.record_write(len);
        if self.total.is_none() {
            self.state.record_tail(block);
        }
        Ok(())
    }
}
