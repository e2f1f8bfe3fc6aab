//! The serial tuning console.
//!
//! A line is `<letter>[<number>]`: the letter picks a parameter or action, the optional
//! number (whitespace before it is allowed) supplies a new value. Setting commands persist
//! the change and print the tuning dump; every response ends with a `>` prompt.
//!
//! | Line | Effect |
//! |---|---|
//! | `p` `i` `d` *x* | proportional, integral, derivative gain (`i` also zeroes the integrator) |
//! | `0` `1` *x* | feedforward gains |
//! | `b` *x* | deadband |
//! | `m` *x* | maximum output |
//! | `f` *x* | maximum error |
//! | `x` *n* | command multiplier, clamped to 1..=22 |
//! | `t` *n* | ticks per servo cycle, clamped to 1..=100 |
//! | `j` *x* | jerk test step in counts (not persisted) |
//! | `k` *x* | set the command position |
//! | `e` | print the live feedback counter |
//! | `l` | print the tuning dump |
//! | `s` | print loop internals and reset the max-error diagnostic |
//! | `r` | zero command, feedback, and error |
//! | anything else | print help |

use core::fmt::Write;

use derive_more::Display;

use crate::axis::{Axis, SharedAxis};
use crate::config::servo_cycle_ms;
use crate::params::ControllerParameters;
use crate::store::{ParameterStorage, ParameterStore};
use crate::tracker::PositionCounters;
use crate::{Error, Result};

/// A persisted parameter reachable from the console.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Setting {
    /// `p`
    ProportionalGain,
    /// `i`
    IntegralGain,
    /// `d`
    DerivativeGain,
    /// `0`
    FeedForward0,
    /// `1`
    FeedForward1,
    /// `b`
    Deadband,
    /// `m`
    MaxOutput,
    /// `f`
    MaxError,
    /// `x`
    Multiplier,
    /// `t`
    TicksPerServoCycle,
}

impl Setting {
    /// Store `value`, clamping the integer-valued settings.
    pub fn apply(self, parameters: &mut ControllerParameters, value: f32) {
        match self {
            Self::ProportionalGain => parameters.pgain = value,
            Self::IntegralGain => parameters.igain = value,
            Self::DerivativeGain => parameters.dgain = value,
            Self::FeedForward0 => parameters.ff0gain = value,
            Self::FeedForward1 => parameters.ff1gain = value,
            Self::Deadband => parameters.deadband = value,
            Self::MaxOutput => parameters.max_output = value,
            Self::MaxError => parameters.max_error = value,
            Self::Multiplier => parameters.set_multiplier(value),
            Self::TicksPerServoCycle => parameters.set_ticks_per_servo_cycle(value),
        }
    }
}

/// One parsed console line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Set (and persist) a parameter, or just print the settings when no value is given.
    Set(Setting, Option<f32>),
    /// Set the jerk test step.
    Jerk(Option<f32>),
    /// Overwrite the command accumulator, then print the encoder.
    SetCommandPosition(Option<f32>),
    /// Print the raw feedback counter.
    PrintEncoder,
    /// Print the tuning dump.
    PrintTuning,
    /// Print loop internals and reset the max-error diagnostic.
    PrintInternals,
    /// Zero command, feedback, and error.
    ResetPosition,
    /// Print usage.
    Help,
}

impl Command {
    /// Parse one line. Unknown letters (and empty lines) parse as [`Command::Help`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) when a value-taking command
    /// is followed by something other than a finite decimal number.
    ///
    /// ```
    /// use axis_servo::command::{Command, Setting};
    ///
    /// assert_eq!(Ok(Command::Set(Setting::ProportionalGain, Some(2.5))), Command::parse("p2.5"));
    /// assert_eq!(Ok(Command::Set(Setting::Multiplier, Some(30.0))), Command::parse("x 30"));
    /// assert_eq!(Ok(Command::Set(Setting::Deadband, None)), Command::parse("b"));
    /// assert_eq!(Ok(Command::Help), Command::parse("z"));
    /// assert!(Command::parse("pfast").is_err());
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let mut chars = line.chars();
        let Some(letter) = chars.next() else {
            return Ok(Self::Help);
        };
        let rest = chars.as_str();

        let setting = |setting: Setting| -> Result<Self> {
            Ok(Self::Set(setting, argument(rest)?))
        };
        match letter {
            'p' => setting(Setting::ProportionalGain),
            'i' => setting(Setting::IntegralGain),
            'd' => setting(Setting::DerivativeGain),
            '0' => setting(Setting::FeedForward0),
            '1' => setting(Setting::FeedForward1),
            'b' => setting(Setting::Deadband),
            'm' => setting(Setting::MaxOutput),
            'f' => setting(Setting::MaxError),
            'x' => setting(Setting::Multiplier),
            't' => setting(Setting::TicksPerServoCycle),
            'j' => Ok(Self::Jerk(argument(rest)?)),
            'k' => Ok(Self::SetCommandPosition(argument(rest)?)),
            'e' => Ok(Self::PrintEncoder),
            'l' => Ok(Self::PrintTuning),
            's' => Ok(Self::PrintInternals),
            'r' => Ok(Self::ResetPosition),
            _ => Ok(Self::Help),
        }
    }
}

fn argument(rest: &str) -> Result<Option<f32>> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(None);
    }
    match rest.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(Error::InvalidArgument),
    }
}

/// Executes console lines against the shared axis.
///
/// Holds the one piece of console state that is not a parameter: the jerk test step, which
/// the [`Supervisor`](crate::supervisor::Supervisor) consumes.
#[derive(Debug, Default)]
pub struct CommandProcessor {
    jerk: f32,
}

impl CommandProcessor {
    /// No jerk test pending.
    #[must_use]
    pub const fn new() -> Self {
        Self { jerk: 0.0 }
    }

    /// Pending jerk test step, in counts. Zero means none.
    #[must_use]
    pub const fn jerk(&self) -> f32 {
        self.jerk
    }

    /// Cancel the jerk test.
    pub const fn clear_jerk(&mut self) {
        self.jerk = 0.0;
    }

    /// Execute one line and write the response to `out`.
    ///
    /// `e` and `k` print the feedback counter as `counters` reads it now. A failed save is
    /// reported on `out` and the new value stays in effect.
    ///
    /// # Errors
    ///
    /// Only [`Error::Console`](crate::Error::Console), when writing the response fails.
    pub fn process_line<S: ParameterStorage>(
        &mut self,
        line: &str,
        axis: &SharedAxis,
        counters: &mut impl PositionCounters,
        store: &mut ParameterStore<S>,
        out: &mut impl Write,
    ) -> Result<()> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err) => return Self::reject(err, out),
        };

        match command {
            Command::Set(setting, value) => {
                if let Some(value) = value {
                    set_and_save(setting, value, axis, store, out)?;
                }
                write_tuning(out, &axis.snapshot())?;
            }
            Command::Jerk(value) => {
                if let Some(value) = value {
                    self.jerk = value;
                    info!("jerk test step set to {}", value);
                }
            }
            Command::SetCommandPosition(value) => {
                if let Some(value) = value {
                    // `as` saturates out-of-range positions.
                    axis.lock(|axis| axis.state.tracker.set_command(value as i32));
                }
                write_encoder(out, counters.read().feedback)?;
            }
            Command::PrintEncoder => write_encoder(out, counters.read().feedback)?,
            Command::PrintTuning => write_tuning(out, &axis.snapshot())?,
            Command::PrintInternals => {
                let (snapshot, max_error) = axis.lock(|axis| {
                    let max_error = axis.take_max_observed_error();
                    (*axis, max_error)
                });
                write_internals(out, &snapshot, max_error)?;
            }
            Command::ResetPosition => {
                axis.lock(Axis::reset_position);
                info!("position reset");
            }
            Command::Help => out.write_str(HELP)?,
        }
        out.write_char('>')?;
        Ok(())
    }

    /// Answer a line that could not be accepted, such as one that overflowed the line buffer.
    ///
    /// # Errors
    ///
    /// Only [`Error::Console`](crate::Error::Console), when writing the response fails.
    pub fn reject(err: Error, out: &mut impl Write) -> Result<()> {
        warn!("rejected command line: {}", err);
        out.write_str("\r\ninvalid value\r\n>")?;
        Ok(())
    }
}

fn set_and_save<S: ParameterStorage>(
    setting: Setting,
    value: f32,
    axis: &SharedAxis,
    store: &mut ParameterStore<S>,
    out: &mut impl Write,
) -> Result<()> {
    // Parameter change and integrator reset land in the same critical section.
    let mut parameters = axis.lock(|axis| {
        setting.apply(&mut axis.parameters, value);
        if setting == Setting::IntegralGain {
            axis.reset_integrator();
        }
        axis.parameters
    });
    debug!("{} set to {}", setting, value);

    match store.save(&mut parameters) {
        Ok(()) => axis.lock(|axis| axis.parameters.checksum = parameters.checksum),
        Err(err) => write!(out, "\r\nsave failed: {err}\r\n")?,
    }
    Ok(())
}

/// Write the tuning dump: every parameter plus the block checksum.
///
/// # Errors
///
/// Propagates `out`'s write errors.
pub fn write_tuning(out: &mut impl Write, axis: &Axis) -> core::fmt::Result {
    let p = &axis.parameters;
    write!(out, "\rCurrent Settings(cksum=0x{:04X}):\r\n", p.checksum)?;
    write!(out, "servo enabled = {}\r\n", u8::from(axis.state.enabled))?;
    write!(out, "(p) = {:.6}\r\n", p.pgain)?;
    write!(out, "(i) = {:.6}\r\n", p.igain)?;
    write!(out, "(d) = {:.6}\r\n", p.dgain)?;
    write!(out, "FF(0) = {:.6}\r\n", p.ff0gain)?;
    write!(out, "FF(1) = {:.6}\r\n", p.ff1gain)?;
    write!(out, "dead(b)and = {:.6}\r\n", p.deadband)?;
    write!(out, "(m)ax Output = {:.6}amps\r\n", p.max_output)?;
    write!(out, "(f)ault error = {:.6}\r\n", p.max_error)?;
    write!(out, "(x)pc cmd multiplier = {}\r\n", p.multiplier)?;
    write!(
        out,
        "(t)icks per servo cycle= {} => {:.6}ms\r\n",
        p.ticks_per_servo_cycle,
        servo_cycle_ms(p.ticks_per_servo_cycle)
    )
}

fn write_encoder(out: &mut impl Write, raw: u16) -> core::fmt::Result {
    write!(out, "\rencoder = 0x{raw:04X} = {raw}\r\n")
}

fn write_internals(out: &mut impl Write, axis: &Axis, max_error: f32) -> core::fmt::Result {
    let state = &axis.state;
    let p = &axis.parameters;
    write!(out, "\rServo Loop Internal Calcs:\r\n")?;
    write!(out, "command: {}\r\n", state.tracker.command())?;
    write!(out, "feedback: {}\r\n", state.tracker.feedback())?;
    write!(out, "error: {:.6}\r\n", state.pid.error)?;
    write!(out, "max error: {max_error:.6}\r\n")?;
    write!(out, "error_i: {:.6}amps\r\n", state.pid.error_integral * p.igain)?;
    write!(out, "error_d: {:.6}amps\r\n", state.pid.error_derivative * p.dgain)?;
    write!(out, "output: {:.6}amps\r\n", state.pid.output)?;
    write!(out, "limit_state: {}\r\n", u8::from(state.pid.in_limit))?;
    write!(out, "fault: {}\r\n", u8::from(state.fault))
}

const HELP: &str = "\r\nUSAGE:\r\n\
p x.x set proportional gain\r\n\
i x.x set integral gain\r\n\
d x.x set differential gain\r\n\
0 x.x set FF0 gain\r\n\
1 x.x set FF1 gain\r\n\
b x.x set deadband\r\n\
m x.x set max output current(amps)\r\n\
f x.x set max error before drive faults(counts)\r\n\
x n   set pc command multiplier (1-22)\r\n\
t n   set # of 250us ticks/per servo calc(1-100)\r\n\
k x.x set command position\r\n\
e print current encoder count\r\n\
l print current loop tuning values\r\n\
s print internal loop components\r\n\
r reset command, feedback and error\r\n\
j x.x alternately posn for loop tuning\r\n\
? print this help\r\n";
