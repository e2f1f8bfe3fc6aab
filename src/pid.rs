//! PID control law.
//!
//! ```text
//! error     = command - feedback
//! errorI   += error * period
//! errorD    = (error - previousError) / period
//! commandD  = (command - previousCommand) / period
//! output    = Pgain * error + Igain * errorI + Dgain * errorD
//!           + FF0 * command + FF1 * commandD
//! fault     = |error| > maxOutput
//! ```
//!
//! By default the deadband and limit parameters are carried but not applied, and the output is
//! left unclamped; the duty-cycle mapping saturates on its own. The `clamped-pid` feature
//! applies them (a limit of zero means "no limit"):
//!
//! ```text
//! if |error| < deadband then error = 0
//! limit error to +/- maxError, errorI to +/- maxErrorI, errorD to +/- maxErrorD,
//! commandD to +/- maxCommandD, output to +/- maxOutput
//! ```

use crate::config::SERVO_TICK_NS;
use crate::params::ControllerParameters;

/// Everything the PID step remembers between servo cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidState {
    /// Command at the previous step, for the command derivative.
    pub previous_command: i32,
    /// Error fed to the control terms at the previous step, for the error derivative.
    pub previous_error: f32,
    /// Latest `command - feedback`, before any deadband or limit.
    pub error: f32,
    /// Integrated error.
    pub error_integral: f32,
    /// Differentiated error.
    pub error_derivative: f32,
    /// Differentiated command.
    pub command_derivative: f32,
    /// Latest output.
    pub output: f32,
    /// Signed error with the largest magnitude seen since the last diagnostic reset.
    pub max_observed_error: f32,
    /// Whether the output was clamped at the last step.
    pub in_limit: bool,
}

impl PidState {
    /// Zeroed state.
    pub const ZERO: Self = Self {
        previous_command: 0,
        previous_error: 0.0,
        error: 0.0,
        error_integral: 0.0,
        error_derivative: 0.0,
        command_derivative: 0.0,
        output: 0.0,
        max_observed_error: 0.0,
        in_limit: false,
    };
}

/// Result of one PID evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidStep {
    /// State to carry into the next cycle.
    pub state: PidState,
    /// `|error|` exceeded `max_output` on this step.
    pub fault: bool,
}

/// Servo cycle period in seconds.
#[must_use]
pub fn period_seconds(ticks_per_servo_cycle: u16) -> f32 {
    let period_ns = u64::from(ticks_per_servo_cycle) * u64::from(SERVO_TICK_NS);
    period_ns as f32 * 1e-9
}

/// Run one PID evaluation.
///
/// Pure: the result depends only on the arguments.
#[must_use]
pub fn step(
    previous: &PidState,
    command: i32,
    feedback: i32,
    parameters: &ControllerParameters,
) -> PidStep {
    let period = period_seconds(parameters.ticks_per_servo_cycle);
    let period_recip = 1.0 / period;

    let error = command.wrapping_sub(feedback) as f32;
    // Fault detection and diagnostics see the raw error; the terms below see the limited one.
    let control_error = error_term(error, parameters);

    let max_observed_error = if error.abs() > previous.max_observed_error.abs() {
        error
    } else {
        previous.max_observed_error
    };

    let error_integral =
        integral_term(previous.error_integral + control_error * period, parameters);
    let error_derivative = derivative_term(
        (control_error - previous.previous_error) * period_recip,
        parameters.max_error_d,
    );
    let command_derivative = derivative_term(
        command.wrapping_sub(previous.previous_command) as f32 * period_recip,
        parameters.max_command_d,
    );

    let raw_output = parameters.pgain * control_error
        + parameters.igain * error_integral
        + parameters.dgain * error_derivative
        + command as f32 * parameters.ff0gain
        + command_derivative * parameters.ff1gain;
    let (output, in_limit) = output_term(raw_output, parameters);

    PidStep {
        state: PidState {
            previous_command: command,
            previous_error: control_error,
            error,
            error_integral,
            error_derivative,
            command_derivative,
            output,
            max_observed_error,
            in_limit,
        },
        fault: error.abs() > parameters.max_output,
    }
}

#[cfg(not(feature = "clamped-pid"))]
const fn error_term(error: f32, _parameters: &ControllerParameters) -> f32 {
    error
}

#[cfg(not(feature = "clamped-pid"))]
const fn integral_term(error_integral: f32, _parameters: &ControllerParameters) -> f32 {
    error_integral
}

#[cfg(not(feature = "clamped-pid"))]
const fn derivative_term(derivative: f32, _limit: f32) -> f32 {
    derivative
}

#[cfg(not(feature = "clamped-pid"))]
const fn output_term(output: f32, _parameters: &ControllerParameters) -> (f32, bool) {
    (output, false)
}

#[cfg(feature = "clamped-pid")]
fn error_term(error: f32, parameters: &ControllerParameters) -> f32 {
    let error = if error.abs() < parameters.deadband {
        0.0
    } else {
        error
    };
    limit(error, parameters.max_error).0
}

#[cfg(feature = "clamped-pid")]
fn integral_term(error_integral: f32, parameters: &ControllerParameters) -> f32 {
    limit(error_integral, parameters.max_error_i).0
}

#[cfg(feature = "clamped-pid")]
fn derivative_term(derivative: f32, max: f32) -> f32 {
    limit(derivative, max).0
}

#[cfg(feature = "clamped-pid")]
fn output_term(output: f32, parameters: &ControllerParameters) -> (f32, bool) {
    limit(output, parameters.max_output)
}

/// Clamp to `+/- max`; a non-positive `max` leaves the value alone.
#[cfg(feature = "clamped-pid")]
fn limit(value: f32, max: f32) -> (f32, bool) {
    if max <= 0.0 {
        (value, false)
    } else if value > max {
        (max, true)
    } else if value < -max {
        (-max, true)
    } else {
        (value, false)
    }
}
