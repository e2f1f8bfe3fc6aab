//! Live-tunable controller parameters and their checksummed storage block.
//!
//! The block is a fixed little-endian record of every persisted field, in the order they are
//! declared on [`ControllerParameters`], followed by a 16-bit checksum:
//!
//! | Offset | Field | Type |
//! |---|---|---|
//! | 0 | `pgain` | `f32` |
//! | 4 | `igain` | `f32` |
//! | 8 | `dgain` | `f32` |
//! | 12 | `ff0gain` | `f32` |
//! | 16 | `ff1gain` | `f32` |
//! | 20 | `max_output` | `f32` |
//! | 24 | `deadband` | `f32` |
//! | 28 | `max_error` | `f32` |
//! | 32 | `max_error_i` | `f32` |
//! | 36 | `max_error_d` | `f32` |
//! | 40 | `max_command_d` | `f32` |
//! | 44 | `multiplier` | `u16` |
//! | 46 | `ticks_per_servo_cycle` | `u16` |
//! | 48 | checksum | `u16` |
//!
//! The checksum is the two's-complement negation of the wrapping sum of the 24 words that
//! precede it, so a valid block sums to zero.

use crate::config::{
    MULTIPLIER_MAX, MULTIPLIER_MIN, TICKS_PER_SERVO_CYCLE_MAX, TICKS_PER_SERVO_CYCLE_MIN,
};
use crate::{Error, Result};

/// Bytes covered by the checksum.
pub const PARAMETER_PAYLOAD_SIZE: usize = 11 * 4 + 2 * 2;

/// Total size of a stored parameter block, checksum included.
pub const PARAMETER_BLOCK_SIZE: usize = PARAMETER_PAYLOAD_SIZE + 2;

/// A stored parameter block.
pub type ParameterBlock = [u8; PARAMETER_BLOCK_SIZE];

/// Gains, limits, and loop rate. The only state that survives a power cycle.
///
/// Several limit fields are carried and persisted but only enforced by the PID step when the
/// `clamped-pid` feature is enabled. See [`pid`](crate::pid).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerParameters {
    /// Proportional gain.
    pub pgain: f32,
    /// Integral gain.
    pub igain: f32,
    /// Derivative gain.
    pub dgain: f32,
    /// Zeroth-order feedforward gain (times command).
    pub ff0gain: f32,
    /// First-order feedforward gain (times command derivative).
    pub ff1gain: f32,
    /// Output limit. Also the position-error fault threshold.
    pub max_output: f32,
    /// Error magnitude below which no correction is applied.
    pub deadband: f32,
    /// Error limit. Also the full-scale error of the duty-cycle mapping.
    pub max_error: f32,
    /// Integrated error limit.
    pub max_error_i: f32,
    /// Differentiated error limit.
    pub max_error_d: f32,
    /// Differentiated command limit.
    pub max_command_d: f32,
    /// Command counts added per host command step, 1..=22.
    pub multiplier: u16,
    /// Hardware ticks per servo cycle, 1..=100.
    pub ticks_per_servo_cycle: u16,
    /// Integrity word of the last saved or loaded block.
    pub checksum: u16,
}

impl ControllerParameters {
    /// Safe defaults: a small proportional gain, everything else off.
    pub const DEFAULT: Self = Self {
        pgain: 0.005,
        igain: 0.0,
        dgain: 0.0,
        ff0gain: 0.0,
        ff1gain: 0.0,
        max_output: 2000.0,
        deadband: 0.0,
        max_error: 1000.0,
        max_error_i: 0.0,
        max_error_d: 0.0,
        max_command_d: 0.0,
        multiplier: 1,
        ticks_per_servo_cycle: 1,
        checksum: 0,
    };

    /// Encode into a block, computing and recording the checksum.
    #[must_use]
    pub fn to_block(&mut self) -> ParameterBlock {
        let mut writer = BlockWriter::new();
        for value in self.gains_and_limits() {
            writer.put(&value.to_le_bytes());
        }
        writer.put(&self.multiplier.to_le_bytes());
        writer.put(&self.ticks_per_servo_cycle.to_le_bytes());
        self.checksum = checksum(writer.payload());
        writer.put(&self.checksum.to_le_bytes());
        writer.into_block()
    }

    /// Decode a block, verifying its checksum and the bounded fields.
    ///
    /// # Errors
    ///
    /// [`Error::ChecksumMismatch`] when the checksum does not cover the stored fields;
    /// [`Error::ParameterOutOfRange`] when the multiplier or tick count is out of bounds.
    pub fn from_block(block: &ParameterBlock) -> Result<Self> {
        let (payload, stored) = block
            .split_last_chunk::<2>()
            .ok_or(Error::StorageCorrupted)?;
        let stored = u16::from_le_bytes(*stored);
        let computed = checksum(payload);
        if stored != computed {
            return Err(Error::ChecksumMismatch { stored, computed });
        }

        let mut reader = BlockReader { rest: payload };
        let parameters = Self {
            pgain: reader.f32()?,
            igain: reader.f32()?,
            dgain: reader.f32()?,
            ff0gain: reader.f32()?,
            ff1gain: reader.f32()?,
            max_output: reader.f32()?,
            deadband: reader.f32()?,
            max_error: reader.f32()?,
            max_error_i: reader.f32()?,
            max_error_d: reader.f32()?,
            max_command_d: reader.f32()?,
            multiplier: reader.u16()?,
            ticks_per_servo_cycle: reader.u16()?,
            checksum: stored,
        };

        if !(MULTIPLIER_MIN..=MULTIPLIER_MAX).contains(&parameters.multiplier)
            || !(TICKS_PER_SERVO_CYCLE_MIN..=TICKS_PER_SERVO_CYCLE_MAX)
                .contains(&parameters.ticks_per_servo_cycle)
        {
            return Err(Error::ParameterOutOfRange);
        }
        Ok(parameters)
    }

    /// Set the command multiplier, clamped to its bounds.
    pub fn set_multiplier(&mut self, requested: f32) {
        self.multiplier = clamp_integer(requested, MULTIPLIER_MIN, MULTIPLIER_MAX);
    }

    /// Set the servo cycle length in ticks, clamped to its bounds.
    pub fn set_ticks_per_servo_cycle(&mut self, requested: f32) {
        self.ticks_per_servo_cycle =
            clamp_integer(requested, TICKS_PER_SERVO_CYCLE_MIN, TICKS_PER_SERVO_CYCLE_MAX);
    }

    const fn gains_and_limits(&self) -> [f32; 11] {
        [
            self.pgain,
            self.igain,
            self.dgain,
            self.ff0gain,
            self.ff1gain,
            self.max_output,
            self.deadband,
            self.max_error,
            self.max_error_i,
            self.max_error_d,
            self.max_command_d,
        ]
    }
}

impl Default for ControllerParameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Negated wrapping sum of the little-endian 16-bit words in `payload`.
#[must_use]
pub fn checksum(payload: &[u8]) -> u16 {
    let sum = payload
        .chunks_exact(2)
        .fold(0u16, |sum, pair| match *pair {
            [low, high] => sum.wrapping_add(u16::from_le_bytes([low, high])),
            _ => sum,
        });
    sum.wrapping_neg()
}

/// Truncate toward zero, then clamp into `min..=max`.
fn clamp_integer(requested: f32, min: u16, max: u16) -> u16 {
    // `as` saturates and maps NaN to zero, which the clamp then lifts to `min`.
    let truncated = requested as i32;
    truncated.clamp(i32::from(min), i32::from(max)) as u16
}

struct BlockWriter {
    block: ParameterBlock,
    len: usize,
}

impl BlockWriter {
    const fn new() -> Self {
        Self {
            block: [0; PARAMETER_BLOCK_SIZE],
            len: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.len.saturating_add(bytes.len());
        if let Some(slot) = self.block.get_mut(self.len..end) {
            slot.copy_from_slice(bytes);
            self.len = end;
        }
    }

    fn payload(&self) -> &[u8] {
        self.block.get(..self.len).unwrap_or(&[])
    }

    const fn into_block(self) -> ParameterBlock {
        self.block
    }
}

struct BlockReader<'a> {
    rest: &'a [u8],
}

impl BlockReader<'_> {
    fn f32(&mut self) -> Result<f32> {
        let (bytes, rest) = self
            .rest
            .split_first_chunk::<4>()
            .ok_or(Error::StorageCorrupted)?;
        self.rest = rest;
        Ok(f32::from_le_bytes(*bytes))
    }

    fn u16(&mut self) -> Result<u16> {
        let (bytes, rest) = self
            .rest
            .split_first_chunk::<2>()
            .ok_or(Error::StorageCorrupted)?;
        self.rest = rest;
        Ok(u16::from_le_bytes(*bytes))
    }
}
