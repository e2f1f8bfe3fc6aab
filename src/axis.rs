//! The servo scheduler and the state it shares with the foreground.
//!
//! [`Axis`] owns the parameters and every piece of volatile controller state. The real-time
//! tick and the foreground reach it only through [`SharedAxis`], which serializes access with a
//! critical section.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use crate::duty::{DutyCommand, DutySink};
use crate::params::ControllerParameters;
use crate::pid::{self, PidState};
use crate::tracker::{PositionCounters, PositionTracker, RawPositions};

/// Volatile controller state. Zeroed at startup and on every re-enable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerState {
    /// Command and feedback accumulators.
    pub tracker: PositionTracker,
    /// PID memory and latest output.
    pub pid: PidState,
    /// Whether the power stage may be driven.
    pub enabled: bool,
    /// Sticky position-error fault. Cleared only by re-enabling.
    pub fault: bool,
}

impl ControllerState {
    /// Disabled and zeroed.
    pub const ZERO: Self = Self {
        tracker: PositionTracker::new(),
        pid: PidState::ZERO,
        enabled: false,
        fault: false,
    };
}

/// One servo axis: parameters, controller state, and the scheduler's gear counter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Axis {
    /// Live-tunable parameters.
    pub parameters: ControllerParameters,
    /// Volatile controller state.
    pub state: ControllerState,
    gear: u16,
    enabled_last_cycle: bool,
}

impl Axis {
    /// Default parameters, disabled, zeroed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parameters: ControllerParameters::DEFAULT,
            state: ControllerState::ZERO,
            gear: 0,
            enabled_last_cycle: false,
        }
    }

    /// Advance the scheduler by one hardware tick.
    ///
    /// Returns the duty command to apply when this tick completed a servo cycle.
    pub fn tick(
        &mut self,
        counters: &mut impl PositionCounters,
        max_duty: u16,
    ) -> Option<DutyCommand> {
        self.gear = self.gear.saturating_add(1);
        if self.gear < self.parameters.ticks_per_servo_cycle {
            return None;
        }
        self.gear = 0;
        Some(self.run_cycle(counters.read(), max_duty))
    }

    /// Run one control cycle on freshly sampled counters.
    ///
    /// Runs while disabled too, so the diagnostics stay current; only the duty command is
    /// suppressed.
    pub fn run_cycle(&mut self, raw: RawPositions, max_duty: u16) -> DutyCommand {
        let enabled = self.state.enabled;
        if enabled && !self.enabled_last_cycle {
            self.rearm(raw);
        }
        self.enabled_last_cycle = enabled;

        self.state.tracker.update(raw, self.parameters.multiplier);
        let step = pid::step(
            &self.state.pid,
            self.state.tracker.command(),
            self.state.tracker.feedback(),
            &self.parameters,
        );
        self.state.pid = step.state;

        if step.fault && !self.state.fault {
            self.state.fault = true;
            warn!("position error {} exceeds limit, output cut", step.state.error);
        }

        if !enabled || self.state.fault {
            return DutyCommand::Neutral;
        }
        DutyCommand::from_output(step.state.output, self.parameters.max_error, max_duty)
    }

    /// Take `raw` as the new position origin and clear every volatile field, the fault included.
    fn rearm(&mut self, raw: RawPositions) {
        self.state.tracker.rearm(raw);
        self.state.pid = PidState::ZERO;
        self.state.fault = false;
        debug!("axis rearmed at command {} feedback {}", raw.command, raw.feedback);
    }

    /// Set the enable flag. The next servo cycle acts on a rising edge.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
    }

    /// Zero the position accumulators and the error terms derived from them.
    pub const fn reset_position(&mut self) {
        self.state.tracker.zero();
        self.state.pid.error = 0.0;
        self.state.pid.previous_error = 0.0;
        self.state.pid.previous_command = 0;
    }

    /// Zero the integrator.
    pub const fn reset_integrator(&mut self) {
        self.state.pid.error_integral = 0.0;
    }

    /// Return the largest-magnitude error seen and start a new observation window.
    pub const fn take_max_observed_error(&mut self) -> f32 {
        let max = self.state.pid.max_observed_error;
        self.state.pid.max_observed_error = 0.0;
        max
    }
}

impl Default for Axis {
    fn default() -> Self {
        Self::new()
    }
}

/// An [`Axis`] shared between the servo tick interrupt and the foreground.
///
/// ```
/// use axis_servo::axis::SharedAxis;
///
/// static AXIS: SharedAxis = SharedAxis::new();
/// AXIS.lock(|axis| axis.parameters.pgain = 0.25);
/// assert_eq!(0.25, AXIS.snapshot().parameters.pgain);
/// ```
pub struct SharedAxis(Mutex<CriticalSectionRawMutex, RefCell<Axis>>);

impl SharedAxis {
    /// A disabled axis with default parameters.
    #[must_use]
    pub const fn new() -> Self {
        Self(Mutex::new(RefCell::new(Axis::new())))
    }

    /// Run `f` with exclusive access to the axis, inside one critical section.
    ///
    /// Do not call `lock` again from inside `f`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut Axis) -> R) -> R {
        self.0.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Copy of the whole axis, taken atomically.
    #[must_use]
    pub fn snapshot(&self) -> Axis {
        self.0.lock(|cell| *cell.borrow())
    }

    /// The servo tick handler: advance the scheduler and, when a cycle ran, drive the output.
    ///
    /// The output registers are written after the critical section ends.
    pub fn servo_tick(&self, counters: &mut impl PositionCounters, sink: &mut impl DutySink) {
        let max_duty = sink.max_duty();
        if let Some(command) = self.lock(|axis| axis.tick(counters, max_duty)) {
            command.apply(sink);
        }
    }
}

impl Default for SharedAxis {
    fn default() -> Self {
        Self::new()
    }
}
