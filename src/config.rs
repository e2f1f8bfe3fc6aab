//! Timing constants, bounds, and default values.

/// Hardware tick that paces the servo scheduler (250 µs).
pub const SERVO_TICK_NS: u32 = 250_000;

/// Rate of the secondary countdown tick used for foreground delays (100 µs per tick).
pub const COUNTDOWN_HZ: u32 = 10_000;

/// Power-up delay before touching storage (0.5 s).
pub const STARTUP_DELAY_TICKS: u32 = 5_000;

/// Settle delay after the servo is enabled (0.25 s).
pub const ENABLE_SETTLE_TICKS: u32 = 2_500;

/// Half period of the fast status blink shown when no configuration was found (0.1 s).
pub const NO_CONFIG_BLINK_TICKS: u32 = 1_000;

/// Time spent on each side of a jerk test step (0.5 s).
pub const JERK_HALF_PERIOD_TICKS: u32 = 5_000;

/// PWM carrier frequency for the power stage.
pub const PWM_FREQUENCY_HZ: u32 = 16_000;

/// Full-scale duty count of the original power stage (`FCY / FPWM - 1`).
pub const DEFAULT_MAX_DUTY: u16 = 1_499;

/// Spin iterations between clearing one direction channel and setting the other.
pub const DIRECTION_SETTLE_SPINS: u32 = 3;

/// Smallest accepted command multiplier.
pub const MULTIPLIER_MIN: u16 = 1;
/// Largest accepted command multiplier.
pub const MULTIPLIER_MAX: u16 = 22;

/// Smallest accepted number of ticks per servo cycle.
pub const TICKS_PER_SERVO_CYCLE_MIN: u16 = 1;
/// Largest accepted number of ticks per servo cycle.
pub const TICKS_PER_SERVO_CYCLE_MAX: u16 = 100;

/// Capacity of one received command line, in bytes.
pub const LINE_CAPACITY: usize = 32;

/// Banner printed at power-up.
pub const BANNER: &str = concat!("axis-servo ", env!("CARGO_PKG_VERSION"));

/// Servo cycle length in milliseconds for a given tick count.
#[must_use]
pub fn servo_cycle_ms(ticks_per_servo_cycle: u16) -> f32 {
    f32::from(ticks_per_servo_cycle) * (SERVO_TICK_NS as f32 / 1_000_000.0)
}
