//! # discrescue
//!
//! A Rust crate for imaging damaged optical discs into raw files.
//!
//! ## Overview
//!
//! `discrescue` copies a CD or DVD sector by sector into an image file, and
//! keeps going where ordinary imaging tools give up:
//!
//! - Failed reads are retried, then retried with smaller block sizes down to
//!   a single sector, so one bad sector only costs that sector
//! - Sectors that cannot be read at all are replaced by zeros and counted
//! - The image is synced after every write, so an interrupted run leaves a
//!   file exactly as long as the data copied
//! - The disc size is estimated from the table of contents, the ISO 9660
//!   volume descriptor or the device length, whichever answers credibly
//!   first
//! - Without a credible size, a long trailing run of zeros or a stalled
//!   image ends the run instead of reading forever
//!
//! ## Example
//!
//! ```no_run
//! use discrescue::{extract, NullSink, OpticalDrive, Options, SizeEstimator};
//! use std::fs::File;
//!
//! let mut drive = OpticalDrive::open("/dev/sr0").unwrap();
//! let estimate = SizeEstimator::new().estimate(&mut drive);
//! let mut image = File::create("disc.iso").unwrap();
//!
//! let state = extract(
//!     &mut drive,
//!     &mut image,
//!     estimate.as_ref(),
//!     &Options::default(),
//!     &mut NullSink,
//! )
//! .unwrap();
//! println!(
//!     "{} bytes, {} sectors zero-filled",
//!     state.bytes_written, state.zero_filled_sectors
//! );
//! ```
//!
//! ## Safety
//!
//! Raw access to optical drives usually requires root privileges or
//! membership in the drive's group. The CLI tool requests sudo permissions
//! when needed.

mod device;
mod error;
mod estimate;
mod extract;
mod options;
mod progress;
mod state;

pub use device::{Device, OpticalDrive, TocEntry, LEADOUT_TRACK};
pub use error::{Error, Result};
pub use extract::run as extract;
pub use estimate::{
    volume_space_blocks, CapacityRange, DeviceLengthProbe, Method, SizeEstimate, SizeEstimator,
    SizeProbe, TocProbe, VolumeDescriptorProbe,
};
pub use options::{BlockLadder, Options, SECTOR_SIZE};
pub use progress::{grid_text, BarRenderer, GridRenderer, NullSink, ProgressSink};
pub use state::{Snapshot, State, Termination};
