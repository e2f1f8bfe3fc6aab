//! Wraparound-safe position tracking.
//!
//! The command and feedback counters are free-running 16-bit hardware registers. Each servo
//! cycle takes the modular difference from the previous reading and adds it into a 32-bit
//! accumulator, so the accumulators follow the true position across any number of counter
//! wraps as long as neither counter moves by half its range (32 768 counts) between readings.

/// Raw 16-bit counter values sampled at the start of a servo cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawPositions {
    /// Position command counter (driven by the host).
    pub command: u16,
    /// Position feedback counter (driven by the motor encoder).
    pub feedback: u16,
}

/// Source of the two free-running position counters.
///
/// Implemented by the hardware decoders; read from interrupt context once per servo cycle.
pub trait PositionCounters {
    /// Sample both counters.
    fn read(&mut self) -> RawPositions;
}

/// Counters held in atomics, for decoders that count in their own interrupt or task.
///
/// ```
/// use axis_servo::tracker::{AtomicPositionCounters, PositionCounters};
///
/// static COUNTERS: AtomicPositionCounters = AtomicPositionCounters::new();
/// COUNTERS.step_feedback(-1);
/// assert_eq!(u16::MAX, (&COUNTERS).read().feedback);
/// ```
pub struct AtomicPositionCounters {
    command: portable_atomic::AtomicU16,
    feedback: portable_atomic::AtomicU16,
}

impl AtomicPositionCounters {
    /// Both counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command: portable_atomic::AtomicU16::new(0),
            feedback: portable_atomic::AtomicU16::new(0),
        }
    }

    /// Move the command counter by `steps`, wrapping like the hardware register.
    pub fn step_command(&self, steps: i16) {
        self.command
            .fetch_add(steps as u16, portable_atomic::Ordering::Relaxed);
    }

    /// Move the feedback counter by `steps`, wrapping like the hardware register.
    pub fn step_feedback(&self, steps: i16) {
        self.feedback
            .fetch_add(steps as u16, portable_atomic::Ordering::Relaxed);
    }
}

impl Default for AtomicPositionCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionCounters for &AtomicPositionCounters {
    fn read(&mut self) -> RawPositions {
        RawPositions {
            command: self.command.load(portable_atomic::Ordering::Relaxed),
            feedback: self.feedback.load(portable_atomic::Ordering::Relaxed),
        }
    }
}

/// Turns raw 16-bit counter readings into unbounded signed positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionTracker {
    last: RawPositions,
    command: i32,
    feedback: i32,
}

impl PositionTracker {
    /// A tracker with zeroed accumulators and zero baselines.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: RawPositions {
                command: 0,
                feedback: 0,
            },
            command: 0,
            feedback: 0,
        }
    }

    /// Take `raw` as the new baseline and zero both accumulators.
    pub const fn rearm(&mut self, raw: RawPositions) {
        self.last = raw;
        self.command = 0;
        self.feedback = 0;
    }

    /// Accumulate the movement since the previous reading.
    ///
    /// The command delta is scaled by `multiplier` (host step counts to encoder counts).
    pub const fn update(&mut self, raw: RawPositions, multiplier: u16) {
        let command_delta = raw.command.wrapping_sub(self.last.command) as i16;
        let feedback_delta = raw.feedback.wrapping_sub(self.last.feedback) as i16;
        self.command = self
            .command
            .wrapping_add((command_delta as i32).wrapping_mul(multiplier as i32));
        self.feedback = self.feedback.wrapping_add(feedback_delta as i32);
        self.last = raw;
    }

    /// Zero both accumulators without moving the baseline.
    pub const fn zero(&mut self) {
        self.command = 0;
        self.feedback = 0;
    }

    /// Offset the command accumulator, as the jerk test and `k` command do.
    pub const fn offset_command(&mut self, counts: i32) {
        self.command = self.command.wrapping_add(counts);
    }

    /// Overwrite the command accumulator.
    pub const fn set_command(&mut self, command: i32) {
        self.command = command;
    }

    /// Accumulated command position.
    #[must_use]
    pub const fn command(&self) -> i32 {
        self.command
    }

    /// Accumulated feedback position.
    #[must_use]
    pub const fn feedback(&self) -> i32 {
        self.feedback
    }

    /// Raw counters seen at the last update.
    #[must_use]
    pub const fn last_raw(&self) -> RawPositions {
        self.last
    }
}
