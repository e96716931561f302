//! Raw optical drive access.
//!
//! The extraction engine only talks to a [`Device`]: positional reads plus
//! the two optional low-level queries used for size estimation. The Linux
//! implementation, [`OpticalDrive`], maps those onto `pread(2)` and the
//! CD-ROM/block-device `ioctl(2)` requests.

use crate::error::{Error, Result};
use crate::options::SECTOR_SIZE;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Track number the table of contents uses for the lead-out area.
pub const LEADOUT_TRACK: u8 = 0xAA;

/// One entry of a disc's table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    /// Track number, or [`LEADOUT_TRACK`] for the lead-out.
    pub track: u8,
    /// Starting logical block address.
    pub lba: u32,
}

/// Capability interface over a raw optical device.
///
/// Every query may fail; callers decide whether a failure matters.
pub trait Device {
    /// Read up to `buf.len()` bytes at the given byte offset.
    ///
    /// Returns `Ok(0)` once the offset lies past the end of the medium.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Read one logical sector by its block address.
    fn read_sector_at(&mut self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<usize> {
        self.read_at(buf, lba * SECTOR_SIZE as u64)
    }

    /// Read the full table of contents, lead-out included.
    fn query_toc(&mut self) -> io::Result<Vec<TocEntry>>;

    /// Ask the device for its length in bytes.
    fn query_length(&mut self) -> io::Result<u64>;
}

// Request codes from <linux/cdrom.h> and <linux/fs.h>.
const CDROMREADTOCHDR: u64 = 0x5305;
const CDROMREADTOCENTRY: u64 = 0x5306;
const CDROM_LBA: u8 = 0x01;
const BLKGETSIZE64: u64 =
    (2 << 30) | ((std::mem::size_of::<usize>() as u64) << 16) | (0x12 << 8) | 114;

/// `struct cdrom_tochdr`
#[repr(C)]
#[derive(Debug, Default)]
struct CdromTocHeader {
    first_track: u8,
    last_track: u8,
}

/// `struct cdrom_tocentry` with the address union read as an LBA.
#[repr(C)]
#[derive(Debug, Default)]
#[allow(dead_code)]
struct CdromTocEntry {
    track: u8,
    adr_ctrl: u8,
    format: u8,
    lba: libc::c_int,
    datamode: u8,
}

/// An optical drive opened for raw sequential imaging.
#[derive(Debug)]
pub struct OpticalDrive {
    /// Path to the device node.
    path: PathBuf,
    /// Read-only handle to the device.
    file: File,
}

impl OpticalDrive {
    /// Open the device node for reading.
    ///
    /// `O_NONBLOCK` lets the open succeed on drives that are still
    /// spinning up; reads block as usual.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    Error::PermissionDenied { source }
                } else {
                    Error::Open {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
        Ok(Self { path, file })
    }

    /// Path of the opened device node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: u64, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is a live, properly sized `repr(C)` value matching
        // the layout the kernel expects for `request`.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg as *mut T) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn toc_entry(&self, track: u8) -> io::Result<TocEntry> {
        let mut entry = CdromTocEntry {
            track,
            format: CDROM_LBA,
            ..Default::default()
        };
        self.ioctl(CDROMREADTOCENTRY, &mut entry)?;
        let lba = u32::try_from(entry.lba).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("track {} reports negative address {}", track, entry.lba),
            )
        })?;
        Ok(TocEntry { track, lba })
    }
}

impl Device for OpticalDrive {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(&self.file, buf, offset)
    }

    fn query_toc(&mut self) -> io::Result<Vec<TocEntry>> {
        let mut header = CdromTocHeader::default();
        self.ioctl(CDROMREADTOCHDR, &mut header)?;
        if header.first_track == 0 || header.first_track > header.last_track {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "illegal track range {}..={}",
                    header.first_track, header.last_track
                ),
            ));
        }

        let mut entries = (header.first_track..=header.last_track)
            .map(|track| self.toc_entry(track))
            .collect::<io::Result<Vec<_>>>()?;
        entries.push(self.toc_entry(LEADOUT_TRACK)?);
        Ok(entries)
    }

    fn query_length(&mut self) -> io::Result<u64> {
        // Plain image files have no block-device ioctls.
        let metadata = self.file.metadata()?;
        if metadata.is_file() {
            return Ok(metadata.len());
        }

        let mut length: u64 = 0;
        self.ioctl(BLKGETSIZE64, &mut length)?;
        Ok(length)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeDevice;
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_missing_device() {
        let err = OpticalDrive::open("/nonexistent/sr9").unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_drive_over_image_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut image = vec![0u8; 20 * SECTOR_SIZE];
        image[16 * SECTOR_SIZE] = 0x42;
        file.write_all(&image).unwrap();
        file.flush().unwrap();

        let mut drive = OpticalDrive::open(file.path()).unwrap();
        assert_eq!(drive.path(), file.path());
        assert_eq!(drive.query_length().unwrap(), image.len() as u64);
        assert!(drive.query_toc().is_err());

        let mut sector = [0u8; SECTOR_SIZE];
        assert_eq!(drive.read_sector_at(16, &mut sector).unwrap(), SECTOR_SIZE);
        assert_eq!(sector[0], 0x42);

        let mut buf = vec![0u8; 4 * SECTOR_SIZE];
        let past_end = image.len() as u64;
        assert_eq!(drive.read_at(&mut buf, past_end).unwrap(), 0);
    }

    #[test]
    fn test_fake_device_failures() {
        let mut device = FakeDevice::new(vec![7u8; 8 * SECTOR_SIZE]).with_bad_sectors([3]);
        let mut buf = vec![0u8; 4 * SECTOR_SIZE];

        // Any read touching sector 3 fails.
        assert!(device.read_at(&mut buf, 0).is_err());
        assert!(device.read_at(&mut buf[..SECTOR_SIZE], 3 * SECTOR_SIZE as u64).is_err());
        assert_eq!(device.read_at(&mut buf[..3 * SECTOR_SIZE], 0).unwrap(), 3 * SECTOR_SIZE);
        assert_eq!(device.read_at(&mut buf, 4 * SECTOR_SIZE as u64).unwrap(), 4 * SECTOR_SIZE);
        assert_eq!(device.read_at(&mut buf, 8 * SECTOR_SIZE as u64).unwrap(), 0);
        assert_eq!(device.reads.len(), 5);

        device.deny = true;
        let err = device.read_at(&mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
