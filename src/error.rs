//! Error types for the library.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort an extraction.
///
/// Transient read failures and unreadable sectors never show up here: the
/// extraction loop absorbs them into its counters. Only conditions that
/// retrying cannot fix are reported.
#[derive(Error, Debug)]
pub enum Error {
    /// The drive refused access, usually because another program holds it
    /// open or the process lacks privileges.
    #[error("permission denied on the drive ({source}): run as root and close programs using it")]
    PermissionDenied {
        #[source]
        source: io::Error,
    },

    /// The device node could not be opened.
    #[error("unable to open device {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination image could not be created.
    #[error("unable to create image file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or syncing the destination image failed.
    #[error("unable to write image data: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    /// The block size ladder does not describe a valid descent.
    #[error("invalid block size ladder: {0}")]
    InvalidLadder(String),
}

impl Error {
    /// Whether this error stems from missing privileges or lock contention.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::PermissionDenied { .. } => true,
            Error::Open { source, .. } | Error::Create { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}
