//! Persistence for [`ControllerParameters`].
//!
//! [`ParameterStore`] owns the checksum discipline; a [`ParameterStorage`] backend only moves
//! whole blocks. Backends: [`MemoryStorage`] for tests and RAM-only setups, [`FileStorage`] on
//! the host, and the RP flash-backed block in `flash_array` on the target.

use crate::params::{ControllerParameters, PARAMETER_BLOCK_SIZE, ParameterBlock};
use crate::{Error, Result};

/// A place that holds exactly one parameter block.
pub trait ParameterStorage {
    /// Read the stored block into `block`.
    ///
    /// Returns `Ok(false)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Backend failures, or a stored record that cannot be a parameter block.
    fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool>;

    /// Replace the stored block with `block` in one operation.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn write_block(&mut self, block: &ParameterBlock) -> Result<()>;
}

impl<T: ParameterStorage + ?Sized> ParameterStorage for &mut T {
    fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool> {
        (**self).read_block(block)
    }

    fn write_block(&mut self, block: &ParameterBlock) -> Result<()> {
        (**self).write_block(block)
    }
}

/// Saves and loads [`ControllerParameters`] through a storage backend.
pub struct ParameterStore<S> {
    storage: S,
}

impl<S: ParameterStorage> ParameterStore<S> {
    /// Wrap a backend.
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load and verify the stored parameters.
    ///
    /// # Errors
    ///
    /// [`Error::NoStoredParameters`] when storage is empty, [`Error::ChecksumMismatch`] or
    /// [`Error::ParameterOutOfRange`] when the stored block is invalid, or a backend error.
    /// Callers keep their defaults on any error.
    pub fn load(&mut self) -> Result<ControllerParameters> {
        let mut block = [0; PARAMETER_BLOCK_SIZE];
        if !self.storage.read_block(&mut block)? {
            info!("no stored parameters");
            return Err(Error::NoStoredParameters);
        }
        let parameters = ControllerParameters::from_block(&block).inspect_err(|err| {
            warn!("stored parameters rejected: {}", err);
        })?;
        info!("parameters loaded, checksum {}", parameters.checksum);
        Ok(parameters)
    }

    /// Recompute the checksum, record it in `parameters`, and write the block.
    ///
    /// # Errors
    ///
    /// Backend failures. `parameters` keeps its new checksum either way.
    pub fn save(&mut self, parameters: &mut ControllerParameters) -> Result<()> {
        let block = parameters.to_block();
        self.storage.write_block(&block).inspect_err(|err| {
            error!("saving parameters failed: {}", err);
        })?;
        debug!("parameters saved, checksum {}", parameters.checksum);
        Ok(())
    }

    /// The backend.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// The backend, mutably.
    pub const fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

/// A backend whose writes stall the servo tick, wrapped so the power stage is made safe first.
///
/// Erasing RP flash keeps interrupts off for tens of milliseconds, during which the bridge
/// would hold its last duty. `before_write` (for example
/// `|| pwm_output::cut_off_outputs(slice)`) runs ahead of every write; the next servo cycle
/// after the write restores the duty.
pub struct QuiescedStorage<S, F> {
    storage: S,
    before_write: F,
}

impl<S, F> QuiescedStorage<S, F>
where
    S: ParameterStorage,
    F: FnMut(),
{
    /// Wrap `storage`.
    pub const fn new(storage: S, before_write: F) -> Self {
        Self {
            storage,
            before_write,
        }
    }

    /// The wrapped backend.
    pub const fn inner(&self) -> &S {
        &self.storage
    }
}

impl<S, F> ParameterStorage for QuiescedStorage<S, F>
where
    S: ParameterStorage,
    F: FnMut(),
{
    fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool> {
        self.storage.read_block(block)
    }

    fn write_block(&mut self, block: &ParameterBlock) -> Result<()> {
        (self.before_write)();
        self.storage.write_block(block)
    }
}

/// Keeps the block in RAM. Writes replace the whole block at once.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    block: Option<ParameterBlock>,
}

impl MemoryStorage {
    /// Nothing stored.
    #[must_use]
    pub const fn new() -> Self {
        Self { block: None }
    }

    /// Storage that already holds `block`.
    #[must_use]
    pub const fn with_block(block: ParameterBlock) -> Self {
        Self { block: Some(block) }
    }

    /// The stored block, if any.
    #[must_use]
    pub const fn block(&self) -> Option<&ParameterBlock> {
        self.block.as_ref()
    }

    /// The stored block for in-place edits, if any.
    pub const fn block_mut(&mut self) -> Option<&mut ParameterBlock> {
        self.block.as_mut()
    }
}

impl ParameterStorage for MemoryStorage {
    fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool> {
        match &self.block {
            Some(stored) => {
                *block = *stored;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn write_block(&mut self, block: &ParameterBlock) -> Result<()> {
        self.block = Some(*block);
        Ok(())
    }
}

#[cfg(feature = "host")]
pub use file::FileStorage;

#[cfg(feature = "host")]
mod file {
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use super::ParameterStorage;
    use crate::params::ParameterBlock;
    use crate::{Error, Result};

    /// Keeps the block in a file.
    ///
    /// Writes go to a sibling temporary file that is then renamed over the target, so a crash
    /// mid-write leaves either the old block or the new one.
    #[derive(Clone, Debug)]
    pub struct FileStorage {
        path: PathBuf,
    }

    impl FileStorage {
        /// Storage backed by the file at `path`. The file need not exist yet.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// The backing file.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temporary_path(&self) -> PathBuf {
            let mut name = self.path.file_name().unwrap_or_default().to_os_string();
            name.push(".tmp");
            self.path.with_file_name(name)
        }
    }

    impl ParameterStorage for FileStorage {
        fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool> {
            let bytes = match std::fs::read(&self.path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
                Err(err) => return Err(err.into()),
            };
            *block = bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::StorageCorrupted)?;
            Ok(true)
        }

        fn write_block(&mut self, block: &ParameterBlock) -> Result<()> {
            let temporary = self.temporary_path();
            std::fs::write(&temporary, block)?;
            std::fs::rename(&temporary, &self.path)?;
            Ok(())
        }
    }
}
