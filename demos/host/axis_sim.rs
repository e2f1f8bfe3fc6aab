//! Host simulation: the controller driving a simulated motor.
//!
//! Threads stand in for the tick interrupts, stdin is the serial console, and parameters are
//! kept in a file (first argument, or `axis_sim.params` in the temp directory). The command
//! counter sweeps back and forth so there is always something to follow.
//!
//! `cargo run --bin demo_host_axis_sim`, then type `?` and Enter.

use std::fmt;
use std::io::{Read, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

use axis_servo::Result;
use axis_servo::axis::SharedAxis;
use axis_servo::config::{DEFAULT_MAX_DUTY, SERVO_TICK_NS};
use axis_servo::countdown::{CountdownDelay, TickCountdown};
use axis_servo::duty::DutySink;
use axis_servo::line_buffer::{Line, SharedLineBuffer};
use axis_servo::store::{FileStorage, ParameterStore};
use axis_servo::supervisor::{Supervisor, SupervisorIo};
use axis_servo::tracker::AtomicPositionCounters;
use log::{Level, LevelFilter, Metadata, Record, debug, info};

static AXIS: SharedAxis = SharedAxis::new();
static COUNTERS: AtomicPositionCounters = AtomicPositionCounters::new();
static COUNTDOWN: TickCountdown = TickCountdown::new();
static LINES: SharedLineBuffer = SharedLineBuffer::new();
static ENABLE: AtomicBool = AtomicBool::new(true);
/// Signed duty currently applied to the simulated bridge.
static DRIVE: AtomicI32 = AtomicI32::new(0);

/// Countdown tick period (100 µs).
const COUNTDOWN_TICK: Duration = Duration::from_micros(100);
/// Motor model update period.
const MOTOR_STEP: Duration = Duration::from_millis(1);
/// Encoder counts per motor step at full duty.
const MOTOR_COUNTS_AT_FULL_DUTY: i32 = 40;
/// Command sweep: counts per motor step and steps per leg.
const SWEEP_RATE: i16 = 2;
const SWEEP_LEG_STEPS: u32 = 2_000;

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Bridge that records its signed duty for the motor model.
struct SimBridge {
    positive: u16,
    negative: u16,
}

impl SimBridge {
    fn publish(&self) {
        DRIVE.store(
            i32::from(self.positive) - i32::from(self.negative),
            Ordering::Relaxed,
        );
    }
}

impl DutySink for SimBridge {
    fn max_duty(&self) -> u16 {
        DEFAULT_MAX_DUTY
    }

    fn set_positive(&mut self, duty: u16) {
        self.positive = duty;
        self.publish();
    }

    fn set_negative(&mut self, duty: u16) {
        self.negative = duty;
        self.publish();
    }
}

struct SimIo;

impl fmt::Write for SimIo {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(s.as_bytes()).map_err(|_| fmt::Error)?;
        stdout.flush().map_err(|_| fmt::Error)
    }
}

impl SupervisorIo for SimIo {
    fn take_line(&mut self) -> Option<Result<Line>> {
        LINES.take()
    }

    fn line_pending(&mut self) -> bool {
        LINES.is_ready()
    }

    fn enable_input(&mut self) -> bool {
        ENABLE.load(Ordering::Relaxed)
    }

    fn set_status_indicator(&mut self, on: bool) {
        debug!("status indicator {}", if on { "on" } else { "off" });
    }
}

fn spawn_servo_tick() {
    thread::spawn(|| {
        let mut counters = &COUNTERS;
        let mut bridge = SimBridge {
            positive: 0,
            negative: 0,
        };
        let period = Duration::from_nanos(u64::from(SERVO_TICK_NS));
        loop {
            AXIS.servo_tick(&mut counters, &mut bridge);
            thread::sleep(period);
        }
    });
}

fn spawn_countdown_tick() {
    thread::spawn(|| {
        loop {
            COUNTDOWN.tick();
            thread::sleep(COUNTDOWN_TICK);
        }
    });
}

fn spawn_motor_and_host() {
    thread::spawn(|| {
        let mut residual = 0;
        let mut step = 0u32;
        loop {
            // Feedback: speed proportional to duty, fractions carried over.
            let travel = DRIVE.load(Ordering::Relaxed) * MOTOR_COUNTS_AT_FULL_DUTY + residual;
            let counts = travel / i32::from(DEFAULT_MAX_DUTY);
            residual = travel % i32::from(DEFAULT_MAX_DUTY);
            COUNTERS.step_feedback(counts.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);

            // Command: triangle sweep.
            let direction = if (step / SWEEP_LEG_STEPS) % 2 == 0 { 1 } else { -1 };
            COUNTERS.step_command(SWEEP_RATE * direction);
            step = step.wrapping_add(1);

            thread::sleep(MOTOR_STEP);
        }
    });
}

fn spawn_console_reader() {
    thread::spawn(|| {
        let mut stdin = std::io::stdin().lock();
        let mut byte = [0u8; 1];
        while let Ok(1) = stdin.read(&mut byte) {
            LINES.push_bytes(&byte);
        }
        info!("console closed");
    });
}

fn main() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }

    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("axis_sim.params"), PathBuf::from);
    info!("parameters file: {}", path.display());

    spawn_servo_tick();
    spawn_countdown_tick();
    spawn_motor_and_host();
    spawn_console_reader();

    let store = ParameterStore::new(FileStorage::new(path));
    let delay = CountdownDelay::new(&COUNTDOWN);
    Supervisor::new(&AXIS, &COUNTERS, store, delay, SimIo).run()
}
