//! H-bridge PWM output on one RP2040/RP2350 PWM slice.
//!
//! Channel A drives the motor forward, channel B in reverse. See [`HBridgePwm`].

use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::pwm::{Config, Pwm};

use crate::config::PWM_FREQUENCY_HZ;
use crate::duty::DutySink;

/// A [`DutySink`] on both outputs of one PWM slice.
///
/// ```rust,no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// # use defmt_rtt as _;
/// use axis_servo::duty::{DutyCommand, DutySink};
/// use axis_servo::pwm_output::HBridgePwm;
/// use embassy_rp::pwm::{Config, Pwm};
///
/// fn example(p: embassy_rp::Peripherals) {
///     // GPIO 16 and 17 are the A and B outputs of PWM slice 0.
///     let pwm = Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_16, p.PIN_17, Config::default());
///     let mut bridge = HBridgePwm::new(pwm, 0);
///     let full = bridge.max_duty();
///     DutyCommand::Positive(full / 2).apply(&mut bridge);
/// }
/// ```
pub struct HBridgePwm<'d> {
    pwm: Pwm<'d>,
    cfg: Config, // Kept so compare updates don't reset the divider
    slice: usize,
}

impl<'d> HBridgePwm<'d> {
    /// Configure the slice for [`PWM_FREQUENCY_HZ`] and start with both channels off.
    ///
    /// `slice` is the slice number, used by [`cut_off_outputs`].
    pub fn new(mut pwm: Pwm<'d>, slice: usize) -> Self {
        let clk = clk_sys_freq();
        // Divider 1: one counter step per system clock.
        let top = (clk / PWM_FREQUENCY_HZ).saturating_sub(1).min(u32::from(u16::MAX)) as u16;

        let mut cfg = Config::default();
        cfg.top = top;
        cfg.phase_correct = false;
        cfg.divider = 1u8.into();
        cfg.compare_a = 0;
        cfg.compare_b = 0;
        cfg.enable = true;
        pwm.set_config(&cfg);

        info!("h-bridge pwm clk={}Hz top={} slice={}", clk, top, slice);
        Self { pwm, cfg, slice }
    }

    /// The slice this bridge drives.
    #[must_use]
    pub const fn slice(&self) -> usize {
        self.slice
    }
}

impl DutySink for HBridgePwm<'_> {
    fn max_duty(&self) -> u16 {
        self.cfg.top
    }

    fn set_positive(&mut self, duty: u16) {
        self.cfg.compare_a = duty.min(self.cfg.top);
        self.pwm.set_config(&self.cfg);
    }

    fn set_negative(&mut self, duty: u16) {
        self.cfg.compare_b = duty.min(self.cfg.top);
        self.pwm.set_config(&self.cfg);
    }
}

/// Zero both compare registers of `slice` without going through a driver handle.
///
/// For panic and fault handlers, where the [`HBridgePwm`] is out of reach.
pub fn cut_off_outputs(slice: usize) {
    embassy_rp::pac::PWM.ch(slice).cc().write(|w| {
        w.set_a(0);
        w.set_b(0);
    });
}
