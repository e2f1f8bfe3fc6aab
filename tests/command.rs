#![allow(missing_docs)]
//! Host-level tests for the serial tuning console.

use axis_servo::axis::SharedAxis;
use axis_servo::command::CommandProcessor;
use axis_servo::params::{ControllerParameters, ParameterBlock};
use axis_servo::store::{MemoryStorage, ParameterStorage, ParameterStore};
use axis_servo::tracker::{AtomicPositionCounters, RawPositions};
use axis_servo::{Error, Result};

struct Console {
    axis: SharedAxis,
    counters: AtomicPositionCounters,
    store: ParameterStore<MemoryStorage>,
    processor: CommandProcessor,
}

impl Console {
    fn new() -> Self {
        Self {
            axis: SharedAxis::new(),
            counters: AtomicPositionCounters::new(),
            store: ParameterStore::new(MemoryStorage::new()),
            processor: CommandProcessor::new(),
        }
    }

    fn send(&mut self, line: &str) -> String {
        let mut out = String::new();
        let mut counters = &self.counters;
        self.processor
            .process_line(line, &self.axis, &mut counters, &mut self.store, &mut out)
            .expect("console write");
        out
    }

    fn parameters(&self) -> ControllerParameters {
        self.axis.snapshot().parameters
    }

    fn stored(&mut self) -> ControllerParameters {
        self.store.load().expect("stored parameters")
    }
}

#[test]
fn set_proportional_gain_persists_and_dumps() {
    let mut console = Console::new();
    let out = console.send("p2.5");

    assert_eq!(2.5, console.parameters().pgain);
    assert_eq!(2.5, console.stored().pgain);
    assert!(out.contains("(p) = 2.500000\r\n"), "{out}");
    assert!(out.contains("Current Settings(cksum=0x"));
    assert!(out.ends_with('>'));

    let checksum = console.parameters().checksum;
    assert!(out.contains(&format!("cksum=0x{checksum:04X}")));
}

#[test]
fn whitespace_before_the_value_is_accepted() {
    let mut console = Console::new();
    console.send("d  0.125");
    assert_eq!(0.125, console.parameters().dgain);
}

#[test]
fn every_setting_letter_reaches_its_field() {
    let mut console = Console::new();
    for line in ["i0.5", "00.25", "1-3", "b4", "m1500", "f700"] {
        console.send(line);
    }
    let stored = console.stored();
    assert_eq!(0.5, stored.igain);
    assert_eq!(0.25, stored.ff0gain);
    assert_eq!(-3.0, stored.ff1gain);
    assert_eq!(4.0, stored.deadband);
    assert_eq!(1500.0, stored.max_output);
    assert_eq!(700.0, stored.max_error);
}

#[test]
fn multiplier_and_ticks_are_clamped() {
    let mut console = Console::new();
    console.send("x30");
    assert_eq!(22, console.parameters().multiplier);
    console.send("x50");
    assert_eq!(22, console.stored().multiplier);
    console.send("x0");
    assert_eq!(1, console.stored().multiplier);

    let out = console.send("t500");
    assert_eq!(100, console.stored().ticks_per_servo_cycle);
    assert!(out.contains("(t)icks per servo cycle= 100 => 25.000000ms"), "{out}");
    console.send("t0");
    assert_eq!(1, console.stored().ticks_per_servo_cycle);
}

#[test]
fn setting_letter_without_value_only_prints() {
    let mut console = Console::new();
    let out = console.send("p");
    assert!(out.contains("(p) = 0.005000"));
    assert_eq!(Err(Error::NoStoredParameters), console.store.load());
}

#[test]
fn integral_gain_change_resets_the_integrator() {
    let mut console = Console::new();
    console
        .axis
        .lock(|axis| axis.state.pid.error_integral = 12.0);
    console.send("i");
    assert_eq!(12.0, console.axis.snapshot().state.pid.error_integral);
    console.send("i0.1");
    assert_eq!(0.0, console.axis.snapshot().state.pid.error_integral);
}

#[test]
fn unknown_letter_prints_help_and_changes_nothing() {
    let mut console = Console::new();
    let before = console.axis.snapshot();
    let out = console.send("z");
    assert!(out.contains("USAGE:"));
    assert!(out.contains("x n   set pc command multiplier (1-22)"));
    assert!(out.ends_with('>'));
    assert_eq!(before, console.axis.snapshot());
    assert_eq!(Err(Error::NoStoredParameters), console.store.load());
}

#[test]
fn malformed_value_is_rejected_without_change() {
    let mut console = Console::new();
    for line in ["pabc", "p1.0.0", "pinf", "pNaN"] {
        let out = console.send(line);
        assert!(out.contains("invalid value"), "{line}: {out}");
        assert!(out.ends_with('>'));
    }
    assert_eq!(0.005, console.parameters().pgain);
}

#[test]
fn jerk_is_set_without_dump_or_save() {
    let mut console = Console::new();
    let out = console.send("j250");
    assert_eq!(250.0, console.processor.jerk());
    assert_eq!(">", out);
    assert_eq!(Err(Error::NoStoredParameters), console.store.load());
}

#[test]
fn encoder_prints_the_live_feedback_counter() {
    let mut console = Console::new();
    console.axis.lock(|axis| {
        axis.run_cycle(
            RawPositions {
                command: 0,
                feedback: 0x0010,
            },
            1499,
        );
    });
    // The counter moves after the last servo cycle sampled it.
    console.counters.step_feedback(-0x4111);
    let out = console.send("e");
    assert!(out.contains("encoder = 0xBEEF = 48879\r\n"), "{out}");
}

#[test]
fn set_command_position_moves_the_accumulator() {
    let mut console = Console::new();
    let out = console.send("k1234");
    assert_eq!(1234, console.axis.snapshot().state.tracker.command());
    assert!(out.contains("encoder = 0x"));
}

#[test]
fn internals_dump_resets_max_error() {
    let mut console = Console::new();
    console.axis.lock(|axis| {
        axis.parameters.igain = 2.0;
        axis.state.pid.max_observed_error = -321.0;
        axis.state.pid.error_integral = 1.5;
    });
    let out = console.send("s");
    assert!(out.contains("Servo Loop Internal Calcs:"));
    assert!(out.contains("max error: -321.000000\r\n"), "{out}");
    assert!(out.contains("error_i: 3.000000amps\r\n"), "{out}");
    assert!(out.contains("limit_state: 0\r\n"));
    assert_eq!(0.0, console.axis.snapshot().state.pid.max_observed_error);

    let out = console.send("s");
    assert!(out.contains("max error: 0.000000\r\n"));
}

#[test]
fn reset_zeroes_position_and_error_but_keeps_gains() {
    let mut console = Console::new();
    console.send("p0.75");
    console.axis.lock(|axis| {
        axis.state.tracker.offset_command(500);
        axis.state.pid.error = 42.0;
        axis.state.pid.previous_error = 41.0;
    });
    let out = console.send("r");
    let axis = console.axis.snapshot();
    assert_eq!(0, axis.state.tracker.command());
    assert_eq!(0, axis.state.tracker.feedback());
    assert_eq!(0.0, axis.state.pid.error);
    assert_eq!(0.0, axis.state.pid.previous_error);
    assert_eq!(0.75, axis.parameters.pgain);
    assert_eq!(">", out);
}

struct FailingStorage;

impl ParameterStorage for FailingStorage {
    fn read_block(&mut self, _block: &mut ParameterBlock) -> Result<bool> {
        Ok(false)
    }

    fn write_block(&mut self, _block: &ParameterBlock) -> Result<()> {
        Err(Error::Storage)
    }
}

#[test]
fn failed_save_is_reported_and_value_kept() {
    let axis = SharedAxis::new();
    let mut store = ParameterStore::new(FailingStorage);
    let mut processor = CommandProcessor::new();
    let mut out = String::new();
    let mut counters = &AtomicPositionCounters::new();
    axis.lock(|axis| axis.parameters.checksum = 0x1234);
    processor
        .process_line("m900", &axis, &mut counters, &mut store, &mut out)
        .expect("console write");
    assert!(out.contains("save failed"), "{out}");
    assert!(out.contains("(m)ax Output = 900.000000amps"));
    assert_eq!(900.0, axis.snapshot().parameters.max_output);
    // The dump keeps showing the checksum storage actually holds.
    assert_eq!(0x1234, axis.snapshot().parameters.checksum);
    assert!(out.contains("cksum=0x1234"), "{out}");
}
