//! Error type shared by the whole crate.

use derive_more::{Display, Error};

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong outside the real-time path.
///
/// The control cycle itself never fails: faults there are latched in the axis state instead.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The stored parameter block does not match its checksum.
    #[display("parameter checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch {
        /// Checksum word read from storage.
        stored: u16,
        /// Checksum recomputed over the stored fields.
        computed: u16,
    },

    /// The stored block passed its checksum but holds a value outside its documented bounds.
    #[display("stored parameter out of range")]
    ParameterOutOfRange,

    /// Storage holds no parameter block at all.
    #[display("no stored parameters")]
    NoStoredParameters,

    /// A command argument is not a finite decimal number.
    #[display("invalid command argument")]
    InvalidArgument,

    /// A console line overflowed the line buffer.
    #[display("command line too long")]
    LineTooLong,

    /// Writing to the console failed.
    #[display("console write failed")]
    Console,

    /// A storage backend failed to read or write.
    #[display("storage backend failure")]
    Storage,

    /// A flash block index lies outside the device.
    #[display("flash block index out of bounds")]
    IndexOutOfBounds,

    /// A flash block failed its framing checks.
    #[display("storage corrupted")]
    StorageCorrupted,

    /// Flash driver error.
    #[cfg(not(feature = "host"))]
    #[display("flash error: {_0:?}")]
    Flash(#[error(not(source))] embassy_rp::flash::Error),

    /// An embassy task could not be spawned.
    #[cfg(feature = "arm")]
    #[display("task spawn failed: {_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),

    /// Host file I/O error.
    #[cfg(feature = "host")]
    #[display("file I/O error: {_0:?}")]
    Io(#[error(not(source))] std::io::ErrorKind),
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::Console
    }
}

#[cfg(feature = "host")]
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.kind())
    }
}
