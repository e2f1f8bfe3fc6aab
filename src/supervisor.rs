//! The foreground loop: startup, console dispatch, jerk test, and the enable input.

use crate::axis::SharedAxis;
use crate::command::{CommandProcessor, write_tuning};
use crate::config::{
    BANNER, ENABLE_SETTLE_TICKS, JERK_HALF_PERIOD_TICKS, NO_CONFIG_BLINK_TICKS,
    STARTUP_DELAY_TICKS, servo_cycle_ms,
};
use crate::countdown::TickDelay;
use crate::line_buffer::Line;
use crate::params::ControllerParameters;
use crate::store::{ParameterStorage, ParameterStore};
use crate::tracker::PositionCounters;
use crate::{Error, Result};

/// The board as the foreground sees it: a console plus two discrete signals.
pub trait SupervisorIo: core::fmt::Write {
    /// Remove and return a completed console line, if one is waiting.
    ///
    /// A line that could not be received whole comes back as an error, which the console
    /// answers with `invalid value`.
    fn take_line(&mut self) -> Option<Result<Line>>;
    /// Whether a completed console line is waiting.
    fn line_pending(&mut self) -> bool;
    /// Level of the external enable input.
    fn enable_input(&mut self) -> bool;
    /// Drive the status indicator.
    fn set_status_indicator(&mut self, on: bool);
}

/// Runs the foreground side of the controller.
pub struct Supervisor<'a, C, S, D, Io> {
    axis: &'a SharedAxis,
    counters: C,
    store: ParameterStore<S>,
    delay: D,
    io: Io,
    commands: CommandProcessor,
    fault_reported: bool,
}

impl<'a, C, S, D, Io> Supervisor<'a, C, S, D, Io>
where
    C: PositionCounters,
    S: ParameterStorage,
    D: TickDelay,
    Io: SupervisorIo,
{
    /// Wire up the foreground. Nothing happens until [`startup`](Self::startup).
    ///
    /// `counters` is read for the console's encoder printout; the servo tick keeps its own.
    pub const fn new(
        axis: &'a SharedAxis,
        counters: C,
        store: ParameterStore<S>,
        delay: D,
        io: Io,
    ) -> Self {
        Self {
            axis,
            counters,
            store,
            delay,
            io,
            commands: CommandProcessor::new(),
            fault_reported: false,
        }
    }

    /// Bring the axis up: defaults, disabled, then the stored parameters if they verify.
    ///
    /// When they do not, the defaults stay in effect and the status indicator blinks fast
    /// until the operator sends a line.
    ///
    /// # Errors
    ///
    /// [`Error::Console`] when the console cannot be written.
    pub fn startup(&mut self) -> Result<()> {
        self.axis.lock(|axis| {
            axis.parameters = ControllerParameters::DEFAULT;
            axis.set_enabled(false);
        });
        write!(self.io, "\r\nPowerup..i/o...uart...timer...{BANNER}\r\n")?;
        self.delay.delay_ticks(STARTUP_DELAY_TICKS, || false);

        match self.store.load() {
            Ok(parameters) => {
                self.axis.lock(|axis| axis.parameters = parameters);
                self.io.write_str("Using setup from eeprom.. ? for help\r\n")?;
                write_tuning(&mut self.io, &self.axis.snapshot())?;
            }
            Err(err) => {
                let stored = match err {
                    Error::ChecksumMismatch { stored, .. } => stored,
                    _ => 0,
                };
                warn!("running on defaults: {}", err);
                write!(self.io, " EEPROM ERROR 0x{stored:04X}\r\n")?;
                self.blink_until_line();
            }
        }

        let ticks = self.axis.snapshot().parameters.ticks_per_servo_cycle;
        write!(
            self.io,
            "using {:.6}ms servo loop interval\r\n",
            servo_cycle_ms(ticks)
        )?;
        Ok(())
    }

    fn blink_until_line(&mut self) {
        let mut on = false;
        while !self.io.line_pending() {
            on = !on;
            self.io.set_status_indicator(on);
            let io = &mut self.io;
            self.delay
                .delay_ticks(NO_CONFIG_BLINK_TICKS, || io.line_pending());
        }
        self.io.set_status_indicator(false);
    }

    /// One pass of the foreground loop.
    ///
    /// # Errors
    ///
    /// [`Error::Console`] when the console cannot be written.
    pub fn poll(&mut self) -> Result<()> {
        match self.io.take_line() {
            Some(Ok(line)) => self.commands.process_line(
                &line,
                self.axis,
                &mut self.counters,
                &mut self.store,
                &mut self.io,
            )?,
            Some(Err(err)) => CommandProcessor::reject(err, &mut self.io)?,
            None => {}
        }
        self.mirror_enable()?;
        if self.commands.jerk() != 0.0 {
            self.run_jerk();
        }
        self.report_fault()
    }

    /// Startup, then [`poll`](Self::poll) forever. Errors are logged and the loop carries on.
    pub fn run(mut self) -> ! {
        if let Err(err) = self.startup() {
            error!("startup: {}", err);
        }
        loop {
            if let Err(err) = self.poll() {
                error!("supervisor: {}", err);
            }
        }
    }

    fn mirror_enable(&mut self) -> Result<()> {
        let input = self.io.enable_input();
        let was_enabled = self.axis.lock(|axis| {
            let was_enabled = axis.state.enabled;
            axis.set_enabled(input);
            was_enabled
        });
        match (was_enabled, input) {
            (false, true) => {
                info!("servo enabled");
                self.io.set_status_indicator(true);
                self.io.write_str("servo enabled\r\n>")?;
                self.delay.delay_ticks(ENABLE_SETTLE_TICKS, || false);
            }
            (true, false) => {
                info!("servo disabled");
                self.io.set_status_indicator(false);
                self.io.write_str("servo disabled\r\n>")?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Step the command accumulator back and forth by the jerk value until cancelled.
    ///
    /// A pending console line or a dropped enable input cancels it, including mid-wait. The
    /// command accumulator always ends where it started.
    fn run_jerk(&mut self) {
        // `as` truncates toward zero, like adding the step to an integer accumulator.
        let counts = self.commands.jerk() as i32;
        info!("jerk test: {} counts", counts);
        while !self.jerk_cancelled() {
            self.axis
                .lock(|axis| axis.state.tracker.offset_command(counts));
            let completed = self.wait_uncancelled(JERK_HALF_PERIOD_TICKS);
            self.axis
                .lock(|axis| axis.state.tracker.offset_command(counts.wrapping_neg()));
            if !completed || !self.wait_uncancelled(JERK_HALF_PERIOD_TICKS) {
                break;
            }
        }
        self.commands.clear_jerk();
        info!("jerk test stopped");
    }

    fn jerk_cancelled(&mut self) -> bool {
        self.io.line_pending() || !self.io.enable_input()
    }

    fn wait_uncancelled(&mut self, ticks: u32) -> bool {
        let io = &mut self.io;
        self.delay
            .delay_ticks(ticks, || io.line_pending() || !io.enable_input())
    }

    fn report_fault(&mut self) -> Result<()> {
        let state = self.axis.snapshot().state;
        if !state.fault {
            self.fault_reported = false;
        } else if !self.fault_reported {
            self.fault_reported = true;
            write!(self.io, "drive fault, error {:.6}\r\n>", state.pid.error)?;
        }
        Ok(())
    }

    /// The console side of the board.
    pub const fn io(&self) -> &Io {
        &self.io
    }

    /// The console side of the board, mutably.
    pub const fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    /// The parameter store.
    pub const fn store(&self) -> &ParameterStore<S> {
        &self.store
    }

    /// The console command processor.
    pub const fn commands(&self) -> &CommandProcessor {
        &self.commands
    }
}
