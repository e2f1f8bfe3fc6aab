//! Single-axis servo position controller for Pico 1 and 2.
//!
//! A host sends a quadrature position command, an encoder reports quadrature feedback, and a
//! PID loop running in interrupt context drives an H-bridge through two PWM channels. Gains and
//! limits are tuned live over a serial line and persisted as a checksummed parameter block.
//!
//! # Glossary
//!
//! - **Servo cycle:** one full control-law evaluation, run every
//!   [`ticks_per_servo_cycle`](params::ControllerParameters::ticks_per_servo_cycle) hardware ticks
//!   of [`SERVO_TICK_NS`](config::SERVO_TICK_NS).
//! - **Countdown tick:** the slower [`COUNTDOWN_HZ`](config::COUNTDOWN_HZ) tick the foreground uses
//!   for its busy-wait delays. See [`countdown`].
//! - **Duty-cycle sink:** the pair of PWM compare registers driving the power stage. See
//!   [`duty::DutySink`].
//! - **Checksum block:** the persisted parameter record plus its 16-bit integrity word. See
//!   [`params`].
//!
//! # Execution contexts
//!
//! [`axis::SharedAxis`] is the one piece of state shared between the real-time tick and the
//! foreground [`supervisor::Supervisor`]. Every access goes through a critical section, so a
//! multi-field update (a gain change plus an integrator reset, say) is never observed half done.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

#[cfg(all(not(feature = "arm"), not(feature = "host")))]
compile_error!("Must enable the 'arm' architecture feature when not building for the host");

// Must come first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod axis;
pub mod command;
pub mod config;
pub mod countdown;
pub mod duty;
mod error;
#[cfg(not(feature = "host"))]
pub mod flash_array;
pub mod line_buffer;
pub mod params;
pub mod pid;
#[cfg(not(feature = "host"))]
pub mod pwm_output;
pub mod store;
pub mod supervisor;
pub mod tracker;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
