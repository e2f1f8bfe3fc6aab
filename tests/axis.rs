#![allow(missing_docs)]
//! Host-level tests for the servo scheduler, the enable edge, and the duty mapping.

use axis_servo::axis::{Axis, SharedAxis};
use axis_servo::config::DEFAULT_MAX_DUTY;
use axis_servo::duty::{DutyCommand, DutySink};
use axis_servo::params::ControllerParameters;
use axis_servo::tracker::{PositionCounters, RawPositions};

#[derive(Default)]
struct FakeCounters {
    raw: RawPositions,
    reads: usize,
}

impl PositionCounters for FakeCounters {
    fn read(&mut self) -> RawPositions {
        self.reads += 1;
        self.raw
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Write {
    Positive(u16),
    Negative(u16),
}

#[derive(Default)]
struct FakeBridge {
    positive: u16,
    negative: u16,
    writes: Vec<Write>,
}

impl DutySink for FakeBridge {
    fn max_duty(&self) -> u16 {
        DEFAULT_MAX_DUTY
    }

    fn set_positive(&mut self, duty: u16) {
        // Never drive both halves at once.
        assert!(duty == 0 || self.negative == 0);
        self.positive = duty;
        self.writes.push(Write::Positive(duty));
    }

    fn set_negative(&mut self, duty: u16) {
        assert!(duty == 0 || self.positive == 0);
        self.negative = duty;
        self.writes.push(Write::Negative(duty));
    }
}

fn raw(command: u16, feedback: u16) -> RawPositions {
    RawPositions { command, feedback }
}

fn enabled_axis(parameters: ControllerParameters) -> Axis {
    let mut axis = Axis::new();
    axis.parameters = parameters;
    axis.set_enabled(true);
    axis
}

#[test]
fn cycle_runs_every_ticks_per_servo_cycle() {
    let mut axis = Axis::new();
    axis.parameters.ticks_per_servo_cycle = 4;
    let mut counters = FakeCounters::default();
    let ran: Vec<bool> = (0..12)
        .map(|_| axis.tick(&mut counters, DEFAULT_MAX_DUTY).is_some())
        .collect();
    assert_eq!(
        vec![false, false, false, true, false, false, false, true, false, false, false, true],
        ran
    );
    assert_eq!(3, counters.reads);
}

#[test]
fn disabled_axis_tracks_but_stays_neutral() {
    let mut axis = Axis::new();
    axis.parameters.pgain = 1.0;
    assert_eq!(DutyCommand::Neutral, axis.run_cycle(raw(300, 0), DEFAULT_MAX_DUTY));
    assert_eq!(300, axis.state.tracker.command());
    assert!((axis.state.pid.output - 300.0).abs() < 1e-3);
}

#[test]
fn enable_edge_rearms_at_the_current_counters() {
    let mut axis = enabled_axis(ControllerParameters {
        pgain: 1.0,
        ..ControllerParameters::DEFAULT
    });
    // Counters were far from zero while disabled: no jump on enable.
    assert_eq!(DutyCommand::Neutral, axis.run_cycle(raw(40_000, 12_000), DEFAULT_MAX_DUTY));
    assert_eq!(0, axis.state.tracker.command());
    assert_eq!(0, axis.state.tracker.feedback());

    let command = axis.run_cycle(raw(40_100, 12_000), DEFAULT_MAX_DUTY);
    // 1499 * 100 / 1000
    assert_eq!(DutyCommand::Positive(149), command);
}

#[test]
fn reenable_resets_all_volatile_state() {
    let mut axis = enabled_axis(ControllerParameters {
        pgain: 0.1,
        igain: 5.0,
        dgain: 0.01,
        ff1gain: 0.001,
        ..ControllerParameters::DEFAULT
    });
    axis.run_cycle(raw(0, 0), DEFAULT_MAX_DUTY);
    for step in 1..20u16 {
        axis.run_cycle(raw(step * 10, step * 7), DEFAULT_MAX_DUTY);
    }
    assert!(axis.state.pid.error_integral != 0.0);

    axis.set_enabled(false);
    axis.run_cycle(raw(500, 100), DEFAULT_MAX_DUTY);
    axis.set_enabled(true);
    axis.run_cycle(raw(500, 100), DEFAULT_MAX_DUTY);

    let pid = axis.state.pid;
    assert_eq!(0, axis.state.tracker.command());
    assert_eq!(0, axis.state.tracker.feedback());
    assert_eq!(0.0, pid.error);
    assert_eq!(0.0, pid.error_integral);
    assert_eq!(0.0, pid.error_derivative);
    assert_eq!(0.0, pid.command_derivative);
    assert_eq!(0, pid.previous_command);
    assert_eq!(0.0, pid.previous_error);
    assert_eq!(0.0, pid.output);
}

#[test]
fn first_cycle_after_enable_is_one_step_of_change() {
    let parameters = ControllerParameters {
        pgain: 0.5,
        dgain: 0.001,
        ..ControllerParameters::DEFAULT
    };
    let mut axis = enabled_axis(parameters);
    axis.run_cycle(raw(1_000, 1_000), DEFAULT_MAX_DUTY);
    axis.run_cycle(raw(1_004, 1_000), DEFAULT_MAX_DUTY);
    let fresh = axis_servo::pid::step(&axis_servo::pid::PidState::ZERO, 4, 0, &parameters);
    assert!((axis.state.pid.output - fresh.state.output).abs() < 1e-3);
}

#[test]
fn large_error_faults_within_one_cycle_and_cuts_output() {
    let mut axis = enabled_axis(ControllerParameters {
        max_output: 1000.0,
        ..ControllerParameters::DEFAULT
    });
    axis.run_cycle(raw(0, 0), DEFAULT_MAX_DUTY);
    assert!(!axis.state.fault);

    let command = axis.run_cycle(raw(2000, 0), DEFAULT_MAX_DUTY);
    assert!(axis.state.fault);
    assert_eq!(DutyCommand::Neutral, command);

    // Sticky while enabled, even once the error is gone.
    assert_eq!(DutyCommand::Neutral, axis.run_cycle(raw(2000, 2000), DEFAULT_MAX_DUTY));
    assert!(axis.state.fault);

    axis.set_enabled(false);
    axis.run_cycle(raw(2000, 2000), DEFAULT_MAX_DUTY);
    assert!(axis.state.fault);
    axis.set_enabled(true);
    axis.run_cycle(raw(2000, 2000), DEFAULT_MAX_DUTY);
    assert!(!axis.state.fault);
}

#[test]
fn duty_mapping_scales_saturates_and_neutralizes() {
    assert_eq!(DutyCommand::Positive(749), DutyCommand::from_output(500.0, 1000.0, 1499));
    assert_eq!(DutyCommand::Negative(749), DutyCommand::from_output(-500.0, 1000.0, 1499));
    assert_eq!(DutyCommand::Positive(1499), DutyCommand::from_output(1e9, 1000.0, 1499));
    assert_eq!(DutyCommand::Negative(1499), DutyCommand::from_output(-1e9, 1000.0, 1499));
    assert_eq!(DutyCommand::Neutral, DutyCommand::from_output(0.5, 1000.0, 1499));
    assert_eq!(DutyCommand::Neutral, DutyCommand::from_output(500.0, 0.0, 1499));
    assert_eq!(DutyCommand::Neutral, DutyCommand::from_output(500.0, -1.0, 1499));
}

#[test]
fn direction_change_clears_the_other_channel_first() {
    let mut bridge = FakeBridge::default();
    DutyCommand::Positive(300).apply(&mut bridge);
    DutyCommand::Negative(200).apply(&mut bridge);
    DutyCommand::Neutral.apply(&mut bridge);
    assert_eq!(
        vec![
            Write::Negative(0),
            Write::Positive(300),
            Write::Positive(0),
            Write::Negative(200),
            Write::Positive(0),
            Write::Negative(0),
        ],
        bridge.writes
    );
}

#[test]
fn shared_axis_tick_drives_the_bridge() {
    static AXIS: SharedAxis = SharedAxis::new();
    AXIS.lock(|axis| {
        axis.parameters.pgain = 1.0;
        axis.set_enabled(true);
    });
    let mut counters = FakeCounters::default();
    let mut bridge = FakeBridge::default();

    AXIS.servo_tick(&mut counters, &mut bridge);
    counters.raw = raw(0, 200);
    AXIS.servo_tick(&mut counters, &mut bridge);
    // error -200, output -200: 1499 * -200 / 1000
    assert_eq!(299, bridge.negative);
    assert_eq!(0, bridge.positive);

    AXIS.lock(|axis| axis.set_enabled(false));
    AXIS.servo_tick(&mut counters, &mut bridge);
    assert_eq!(0, bridge.negative);
    assert_eq!(0, bridge.positive);
}
