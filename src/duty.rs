//! Mapping from controller output to the two-channel PWM power stage.

use crate::config::DIRECTION_SETTLE_SPINS;

/// The pair of PWM compare registers that drive the H-bridge.
///
/// One channel drives the motor forward, the other in reverse. At most one is ever non-zero.
pub trait DutySink {
    /// Full-scale duty count.
    fn max_duty(&self) -> u16;
    /// Set the forward channel's duty count.
    fn set_positive(&mut self, duty: u16);
    /// Set the reverse channel's duty count.
    fn set_negative(&mut self, duty: u16);
}

impl<T: DutySink + ?Sized> DutySink for &mut T {
    fn max_duty(&self) -> u16 {
        (**self).max_duty()
    }

    fn set_positive(&mut self, duty: u16) {
        (**self).set_positive(duty);
    }

    fn set_negative(&mut self, duty: u16) {
        (**self).set_negative(duty);
    }
}

/// What to drive the power stage with this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyCommand {
    /// Forward channel at this duty count, reverse channel off.
    Positive(u16),
    /// Reverse channel at this duty count, forward channel off.
    Negative(u16),
    /// Both channels off.
    Neutral,
}

impl DutyCommand {
    /// Scale a controller output so that `max_error` maps to full duty.
    ///
    /// The scaled value is truncated toward zero and saturates at `max_duty` in either
    /// direction. A zero result, or a non-positive `max_error`, gives [`DutyCommand::Neutral`].
    ///
    /// ```
    /// use axis_servo::duty::DutyCommand;
    ///
    /// assert_eq!(DutyCommand::Positive(749), DutyCommand::from_output(500.0, 1000.0, 1499));
    /// assert_eq!(DutyCommand::Negative(1499), DutyCommand::from_output(-5e6, 1000.0, 1499));
    /// assert_eq!(DutyCommand::Neutral, DutyCommand::from_output(0.4, 1000.0, 1499));
    /// ```
    #[must_use]
    pub fn from_output(output: f32, max_error: f32, max_duty: u16) -> Self {
        if max_error <= 0.0 || max_error.is_nan() {
            return Self::Neutral;
        }
        // `as` saturates and sends NaN to zero.
        let scaled = (f32::from(max_duty) * output / max_error) as i32;
        let magnitude = scaled.unsigned_abs().min(u32::from(max_duty)) as u16;
        match scaled {
            0 => Self::Neutral,
            s if s > 0 => Self::Positive(magnitude),
            _ => Self::Negative(magnitude),
        }
    }

    /// Drive `sink`, always clearing the opposite channel before setting the active one.
    pub fn apply(self, sink: &mut impl DutySink) {
        match self {
            Self::Positive(duty) => {
                sink.set_negative(0);
                settle();
                sink.set_positive(duty);
            }
            Self::Negative(duty) => {
                sink.set_positive(0);
                settle();
                sink.set_negative(duty);
            }
            Self::Neutral => {
                sink.set_positive(0);
                sink.set_negative(0);
            }
        }
    }
}

/// Dead time between releasing one half-bridge and driving the other.
fn settle() {
    for _ in 0..DIRECTION_SETTLE_SPINS {
        core::hint::spin_loop();
    }
}
