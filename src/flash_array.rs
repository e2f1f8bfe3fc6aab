//! Parameter storage in the RP2040/RP2350 internal flash.
//!
//! Flash is treated as an array of erase blocks counted from the end of memory backward.
//! [`FlashArray::new`] reserves `N` of them; each [`FlashBlock`] then holds one parameter
//! block, framed so that erased or half-written flash is never mistaken for data:
//!
//! | Offset | Content |
//! |---|---|
//! | 0 | magic `u32` |
//! | 4 | payload length `u16` |
//! | 6 | payload (the parameter block) |
//! | 6 + len | CRC32 of everything before it |
//!
//! The parameter block's own 16-bit checksum is verified separately by
//! [`ParameterStore`](crate::store::ParameterStore).

use core::array;
use core::cell::RefCell;

use crc32fast::Hasher;
use embassy_rp::Peri;
use embassy_rp::flash::{Blocking, ERASE_SIZE, Flash as EmbassyFlash, PAGE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU32, Ordering};
use static_cell::StaticCell;

use crate::params::{PARAMETER_BLOCK_SIZE, ParameterBlock};
use crate::store::ParameterStorage;
use crate::{Error, Result};

// Internal flash size for Raspberry Pi Pico 2 (4 MB).
#[cfg(feature = "pico2")]
const INTERNAL_FLASH_SIZE: usize = 4 * 1024 * 1024;

// Internal flash size for Raspberry Pi Pico 1 (2 MB).
#[cfg(not(feature = "pico2"))]
const INTERNAL_FLASH_SIZE: usize = 2 * 1024 * 1024;

const MAGIC: u32 = 0x5052_4D53; // 'PRMS'
const HEADER_SIZE: usize = 4 + 2; // Magic + PayloadLen
const CRC_SIZE: usize = 4;
const FRAME_SIZE: usize = HEADER_SIZE + PARAMETER_BLOCK_SIZE + CRC_SIZE;
const TOTAL_BLOCKS: u32 = (INTERNAL_FLASH_SIZE / ERASE_SIZE) as u32;

const _: () = assert!(FRAME_SIZE <= PAGE_SIZE);

type Driver = EmbassyFlash<'static, FLASH, Blocking, INTERNAL_FLASH_SIZE>;

/// Shared flash manager that owns the hardware driver and allocation cursor.
struct FlashManager {
    flash: Mutex<CriticalSectionRawMutex, RefCell<Driver>>,
    next_block: AtomicU32,
}

impl FlashManager {
    fn new(peripheral: Peri<'static, FLASH>) -> Self {
        Self {
            flash: Mutex::new(RefCell::new(EmbassyFlash::new_blocking(peripheral))),
            next_block: AtomicU32::new(0),
        }
    }

    fn with_flash<R>(&self, f: impl FnOnce(&mut Driver) -> Result<R>) -> Result<R> {
        self.flash.lock(|flash| f(&mut flash.borrow_mut()))
    }

    fn reserve<const N: usize>(&'static self) -> Result<[FlashBlock; N]> {
        let start = self.next_block.fetch_add(N as u32, Ordering::SeqCst);
        let end = start.checked_add(N as u32).ok_or(Error::IndexOutOfBounds)?;
        if end > TOTAL_BLOCKS {
            // rollback
            self.next_block.fetch_sub(N as u32, Ordering::SeqCst);
            return Err(Error::IndexOutOfBounds);
        }
        Ok(array::from_fn(|idx| FlashBlock {
            manager: self,
            block: start.wrapping_add(idx as u32),
        }))
    }
}

/// One reserved erase block holding a parameter block.
pub struct FlashBlock {
    manager: &'static FlashManager,
    block: u32,
}

impl FlashBlock {
    /// Erase this block, so the next load reports nothing stored.
    ///
    /// # Errors
    ///
    /// Flash driver failures.
    pub fn clear(&mut self) -> Result<()> {
        let offset = block_offset(self.block);
        self.manager.with_flash(|flash| {
            flash
                .blocking_erase(offset, offset.wrapping_add(ERASE_SIZE as u32))
                .map_err(Error::Flash)
        })?;
        info!("Flash: Cleared block {}", self.block);
        Ok(())
    }
}

impl ParameterStorage for FlashBlock {
    fn read_block(&mut self, block: &mut ParameterBlock) -> Result<bool> {
        let offset = block_offset(self.block);
        let mut frame = [0u8; FRAME_SIZE];
        self.manager.with_flash(|flash| {
            flash
                .blocking_read(offset, &mut frame)
                .map_err(Error::Flash)
        })?;

        let (magic, rest) = frame
            .split_first_chunk::<4>()
            .ok_or(Error::StorageCorrupted)?;
        if u32::from_le_bytes(*magic) != MAGIC {
            info!("Flash: No data at block {}", self.block);
            return Ok(false);
        }
        let (len, rest) = rest
            .split_first_chunk::<2>()
            .ok_or(Error::StorageCorrupted)?;
        if usize::from(u16::from_le_bytes(*len)) != PARAMETER_BLOCK_SIZE {
            error!("Flash: Invalid payload length at block {}", self.block);
            return Err(Error::StorageCorrupted);
        }
        let (payload, rest) = rest
            .split_first_chunk::<PARAMETER_BLOCK_SIZE>()
            .ok_or(Error::StorageCorrupted)?;
        let (stored_crc, _) = rest
            .split_first_chunk::<CRC_SIZE>()
            .ok_or(Error::StorageCorrupted)?;
        let stored_crc = u32::from_le_bytes(*stored_crc);
        let computed_crc = compute_crc(
            frame
                .get(..HEADER_SIZE + PARAMETER_BLOCK_SIZE)
                .ok_or(Error::StorageCorrupted)?,
        );
        if stored_crc != computed_crc {
            error!(
                "Flash: CRC mismatch at block {} (expected {}, found {})",
                self.block, computed_crc, stored_crc
            );
            return Err(Error::StorageCorrupted);
        }

        *block = *payload;
        info!("Flash: Loaded parameters from block {}", self.block);
        Ok(true)
    }

    /// Erase and program the block.
    ///
    /// Interrupts stay off for the whole erase, so no servo tick runs and the bridge keeps its
    /// last duty. Wrap the block in [`QuiescedStorage`](crate::store::QuiescedStorage) to cut
    /// the outputs first.
    fn write_block(&mut self, block: &ParameterBlock) -> Result<()> {
        // Unwritten bytes stay in the erased state.
        let mut page = [0xFFu8; PAGE_SIZE];
        let mut frame = FrameWriter { page: &mut page, len: 0 };
        frame.put(&MAGIC.to_le_bytes());
        frame.put(&(PARAMETER_BLOCK_SIZE as u16).to_le_bytes());
        frame.put(block);
        let crc = compute_crc(frame.written());
        frame.put(&crc.to_le_bytes());

        let offset = block_offset(self.block);
        self.manager.with_flash(|flash| {
            flash
                .blocking_erase(offset, offset.wrapping_add(ERASE_SIZE as u32))
                .map_err(Error::Flash)?;
            flash.blocking_write(offset, &page).map_err(Error::Flash)
        })?;

        info!("Flash: Saved {} bytes to block {}", FRAME_SIZE, self.block);
        Ok(())
    }
}

struct FrameWriter<'a> {
    page: &'a mut [u8; PAGE_SIZE],
    len: usize,
}

impl FrameWriter<'_> {
    fn put(&mut self, bytes: &[u8]) {
        let end = self.len.saturating_add(bytes.len());
        if let Some(slot) = self.page.get_mut(self.len..end) {
            slot.copy_from_slice(bytes);
            self.len = end;
        }
    }

    fn written(&self) -> &[u8] {
        self.page.get(..self.len).unwrap_or(&[])
    }
}

/// Static resources for [`FlashArray`].
struct FlashArrayStatic {
    manager_cell: StaticCell<FlashManager>,
    manager_ref: Mutex<CriticalSectionRawMutex, RefCell<Option<&'static FlashManager>>>,
}

impl FlashArrayStatic {
    const fn new() -> Self {
        Self {
            manager_cell: StaticCell::new(),
            manager_ref: Mutex::new(RefCell::new(None)),
        }
    }

    fn manager(&'static self, peripheral: Peri<'static, FLASH>) -> &'static FlashManager {
        self.manager_ref.lock(|slot_cell| {
            *slot_cell
                .borrow_mut()
                .get_or_insert_with(|| &*self.manager_cell.init(FlashManager::new(peripheral)))
        })
    }
}

/// Reserves erase blocks at the end of flash for parameter storage.
///
/// ⚠️ **Warning**: firmware and data share the same flash device. Reserving too many blocks
/// can overwrite the firmware image.
///
/// ```rust,no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// # use defmt_rtt as _;
/// use axis_servo::flash_array::FlashArray;
/// use axis_servo::store::ParameterStore;
///
/// fn example(p: embassy_rp::Peripherals) -> axis_servo::Result<()> {
///     let [parameter_block] = FlashArray::<1>::new(p.FLASH)?;
///     let mut store = ParameterStore::new(parameter_block);
///     let mut parameters = store.load().unwrap_or_default();
///     parameters.pgain = 0.01;
///     store.save(&mut parameters)
/// }
/// ```
pub struct FlashArray<const N: usize>;

impl<const N: usize> FlashArray<N> {
    /// Reserve `N` contiguous blocks.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] when the flash has no room left.
    pub fn new(peripheral: Peri<'static, FLASH>) -> Result<[FlashBlock; N]> {
        static FLASH_STATIC: FlashArrayStatic = FlashArrayStatic::new();
        let manager = FLASH_STATIC.manager(peripheral);
        manager.reserve::<N>()
    }
}

/// Blocks are allocated from the end of flash backwards.
const fn block_offset(block_id: u32) -> u32 {
    let capacity = INTERNAL_FLASH_SIZE as u32;
    capacity - (block_id + 1) * ERASE_SIZE as u32
}

/// Compute CRC32 checksum.
fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
