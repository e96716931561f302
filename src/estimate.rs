//! Total image size estimation.
//!
//! Optical drives are unreliable about reporting how much data a disc
//! holds, especially damaged ones. [`SizeEstimator`] asks several
//! independent sources in a fixed order and keeps the first answer that
//! looks like a real disc capacity.

use crate::device::{Device, LEADOUT_TRACK};
use crate::options::SECTOR_SIZE;

use std::fmt;
use std::io;
use std::ops::RangeInclusive;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Sector holding the primary volume descriptor on ISO 9660 media.
const VOLUME_DESCRIPTOR_SECTOR: u64 = 16;

/// Where an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Lead-out address from the table of contents.
    Toc,
    /// Volume space size from the ISO 9660 primary volume descriptor.
    VolumeDescriptor,
    /// Length reported by the block device.
    DeviceLength,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Toc => "TOC",
            Method::VolumeDescriptor => "ISO9660",
            Method::DeviceLength => "device length",
        })
    }
}

/// Range of totals accepted as a plausible disc capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRange(RangeInclusive<u64>);

impl CapacityRange {
    /// Accept totals within `range`, zero excluded.
    pub fn new(range: RangeInclusive<u64>) -> Self {
        Self(range)
    }

    /// Whether `total` is non-zero and within the range.
    pub fn contains(&self, total: u64) -> bool {
        total != 0 && self.0.contains(&total)
    }
}

impl Default for CapacityRange {
    /// From a small CD-sized disc up to a dual-layer DVD.
    fn default() -> Self {
        Self(500 * MIB..=9 * GIB)
    }
}

/// A credible total image size and the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    total: u64,
    method: Method,
}

impl SizeEstimate {
    /// Accept `total` only if it lies within `range`.
    pub fn checked(total: u64, method: Method, range: &CapacityRange) -> Option<Self> {
        range.contains(total).then_some(Self { total, method })
    }

    /// Estimated image size in bytes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Source that produced the estimate.
    pub fn method(&self) -> Method {
        self.method
    }
}

/// One independent source of a size estimate.
pub trait SizeProbe {
    /// Provenance tag for answers from this probe.
    fn method(&self) -> Method;

    /// Total size in bytes, or `None` if the source had no answer.
    fn probe(&self, device: &mut dyn Device) -> io::Result<Option<u64>>;
}

/// Lead-out start address from the table of contents.
#[derive(Debug, Default)]
pub struct TocProbe;

impl SizeProbe for TocProbe {
    fn method(&self) -> Method {
        Method::Toc
    }

    fn probe(&self, device: &mut dyn Device) -> io::Result<Option<u64>> {
        let toc = device.query_toc()?;
        Ok(toc
            .iter()
            .find(|entry| entry.track == LEADOUT_TRACK)
            .map(|leadout| (u64::from(leadout.lba) + 1) * SECTOR_SIZE as u64))
    }
}

/// Volume space size from the ISO 9660 primary volume descriptor.
#[derive(Debug, Default)]
pub struct VolumeDescriptorProbe;

impl SizeProbe for VolumeDescriptorProbe {
    fn method(&self) -> Method {
        Method::VolumeDescriptor
    }

    fn probe(&self, device: &mut dyn Device) -> io::Result<Option<u64>> {
        let mut sector = [0u8; SECTOR_SIZE];
        let n = device.read_sector_at(VOLUME_DESCRIPTOR_SECTOR, &mut sector)?;
        Ok(volume_space_blocks(&sector[..n]).map(|blocks| u64::from(blocks) * SECTOR_SIZE as u64))
    }
}

/// Decode the volume space size of a primary volume descriptor.
///
/// The field is stored twice, little-endian at offset 80 and big-endian at
/// offset 84. Mastering tools disagree about which copy they fill in
/// correctly, so the larger of the two is used. This is a compatibility
/// choice rather than anything ISO 9660 guarantees.
pub fn volume_space_blocks(sector: &[u8]) -> Option<u32> {
    if sector.len() < SECTOR_SIZE || sector[0] != 0x01 || &sector[1..6] != b"CD001" {
        return None;
    }
    let le = u32::from_le_bytes([sector[80], sector[81], sector[82], sector[83]]);
    let be = u32::from_be_bytes([sector[84], sector[85], sector[86], sector[87]]);
    Some(le.max(be))
}

/// Length reported by the device itself.
#[derive(Debug, Default)]
pub struct DeviceLengthProbe;

impl SizeProbe for DeviceLengthProbe {
    fn method(&self) -> Method {
        Method::DeviceLength
    }

    fn probe(&self, device: &mut dyn Device) -> io::Result<Option<u64>> {
        device.query_length().map(Some)
    }
}

/// Tries each probe in order and keeps the first credible answer.
pub struct SizeEstimator {
    probes: Vec<Box<dyn SizeProbe>>,
    range: CapacityRange,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        Self::with_range(CapacityRange::default())
    }
}

impl SizeEstimator {
    /// TOC, then volume descriptor, then device length.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard probe order with a custom plausibility range.
    pub fn with_range(range: CapacityRange) -> Self {
        Self {
            probes: vec![
                Box::new(TocProbe),
                Box::new(VolumeDescriptorProbe),
                Box::new(DeviceLengthProbe),
            ],
            range,
        }
    }

    /// Estimate the total image size of the disc in `device`.
    ///
    /// Never fails: a probe that errors or answers implausibly is skipped,
    /// and `None` means no probe produced a credible total.
    pub fn estimate(&self, device: &mut dyn Device) -> Option<SizeEstimate> {
        for probe in &self.probes {
            let method = probe.method();
            match probe.probe(device) {
                Ok(Some(total)) => match SizeEstimate::checked(total, method, &self.range) {
                    Some(estimate) => {
                        log::info!("{} reports {} bytes", method, total);
                        return Some(estimate);
                    }
                    None => log::debug!("{} reports implausible size {}", method, total),
                },
                Ok(None) => log::debug!("{} gave no size", method),
                Err(e) => log::debug!("{} query failed: {}", method, e),
            }
        }
        None
    }
}
