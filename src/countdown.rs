//! Foreground delays paced by the secondary countdown tick.
//!
//! The tick handler decrements a shared counter toward zero; the foreground loads it and
//! busy-waits until it runs out. A waiter may bail out early through its cancel check, which
//! is how the jerk test stops the moment a command line arrives.

use portable_atomic::{AtomicU32, Ordering};

/// A countdown decremented from interrupt context at [`COUNTDOWN_HZ`](crate::config::COUNTDOWN_HZ).
pub struct TickCountdown {
    remaining: AtomicU32,
}

impl TickCountdown {
    /// An expired countdown.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remaining: AtomicU32::new(0),
        }
    }

    /// Tick handler: one step toward zero, stopping there.
    pub fn tick(&self) {
        // An `Err` only means the countdown already reached zero.
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Load the countdown with `ticks`.
    pub fn start(&self, ticks: u32) {
        self.remaining.store(ticks, Ordering::Release);
    }

    /// Ticks left before expiry.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

impl Default for TickCountdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellable delay measured in countdown ticks.
pub trait TickDelay {
    /// Wait `ticks` countdown ticks, polling `cancel` while waiting.
    ///
    /// Returns `false` if `cancel` returned `true` before the delay ran out.
    fn delay_ticks(&mut self, ticks: u32, cancel: impl FnMut() -> bool) -> bool;
}

/// Busy-waits on a [`TickCountdown`].
pub struct CountdownDelay<'a> {
    countdown: &'a TickCountdown,
}

impl<'a> CountdownDelay<'a> {
    /// Delay against `countdown`.
    #[must_use]
    pub const fn new(countdown: &'a TickCountdown) -> Self {
        Self { countdown }
    }
}

impl TickDelay for CountdownDelay<'_> {
    fn delay_ticks(&mut self, ticks: u32, mut cancel: impl FnMut() -> bool) -> bool {
        self.countdown.start(ticks);
        while self.countdown.remaining() > 0 {
            if cancel() {
                return false;
            }
            core::hint::spin_loop();
        }
        true
    }
}
