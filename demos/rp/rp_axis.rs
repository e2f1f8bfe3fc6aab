//! Single-axis servo on a Pico.
//!
//! | Signal | Pin |
//! |---|---|
//! | command quadrature A/B (PIO0 SM0) | GPIO 2, 3 |
//! | feedback encoder A/B (PIO0 SM1) | GPIO 4, 5 |
//! | enable input (active high) | GPIO 15 |
//! | H-bridge forward/reverse (PWM slice 0 A/B) | GPIO 16, 17 |
//! | console UART0 TX/RX | GPIO 0, 1 |
//! | status LED | GPIO 25 |
//!
//! The 250 µs servo tick, the 100 µs countdown tick, and the encoder decoders run on a
//! high-priority interrupt executor; console reception runs on a lower one. The supervisor
//! owns thread mode and never returns. A panic ends in a hard fault, which cuts both PWM
//! channels and parks the core. Saving parameters cuts both channels too, since the flash
//! erase holds off the servo tick.
#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use axis_servo::axis::SharedAxis;
use axis_servo::config::{COUNTDOWN_HZ, SERVO_TICK_NS};
use axis_servo::countdown::{CountdownDelay, TickCountdown};
use axis_servo::flash_array::FlashArray;
use axis_servo::line_buffer::{Line, SharedLineBuffer};
use axis_servo::pwm_output::{HBridgePwm, cut_off_outputs};
use axis_servo::store::{ParameterStore, QuiescedStorage};
use axis_servo::supervisor::{Supervisor, SupervisorIo};
use axis_servo::tracker::AtomicPositionCounters;
use axis_servo::{Error, Result};
use cortex_m_rt::{ExceptionFrame, entry, exception};
use embassy_executor::InterruptExecutor;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{PIO0, UART0};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::pio_programs::rotary_encoder::{Direction, PioEncoder, PioEncoderProgram};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::uart::{
    Async, Config as UartConfig, InterruptHandler as UartInterruptHandler, Uart, UartRx, UartTx,
};
use embassy_time::{Duration, Ticker};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
    UART0_IRQ => UartInterruptHandler<UART0>;
});

const H_BRIDGE_SLICE: usize = 0;

static AXIS: SharedAxis = SharedAxis::new();
static COUNTERS: AtomicPositionCounters = AtomicPositionCounters::new();
static COUNTDOWN: TickCountdown = TickCountdown::new();
static LINES: SharedLineBuffer = SharedLineBuffer::new();

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
#[expect(unsafe_code, reason = "executor interrupt entry point")]
unsafe fn SWI_IRQ_1() {
    // SAFETY: only this interrupt drives the high-priority executor.
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[interrupt]
#[expect(unsafe_code, reason = "executor interrupt entry point")]
unsafe fn SWI_IRQ_0() {
    // SAFETY: only this interrupt drives the low-priority executor.
    unsafe { EXECUTOR_LOW.on_interrupt() }
}

#[exception]
#[expect(unsafe_code, reason = "exception handlers are unsafe to define")]
unsafe fn HardFault(_frame: &ExceptionFrame) -> ! {
    cut_off_outputs(H_BRIDGE_SLICE);
    loop {
        cortex_m::asm::nop();
    }
}

#[embassy_executor::task]
async fn servo_tick_task(mut bridge: HBridgePwm<'static>) -> ! {
    let mut ticker = Ticker::every(Duration::from_micros(u64::from(SERVO_TICK_NS / 1_000)));
    let mut counters = &COUNTERS;
    loop {
        AXIS.servo_tick(&mut counters, &mut bridge);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn countdown_tick_task() -> ! {
    let mut ticker = Ticker::every(Duration::from_hz(u64::from(COUNTDOWN_HZ)));
    loop {
        COUNTDOWN.tick();
        ticker.next().await;
    }
}

const fn steps(direction: Direction) -> i16 {
    match direction {
        Direction::Clockwise => 1,
        Direction::CounterClockwise => -1,
    }
}

#[embassy_executor::task]
async fn command_decoder_task(mut decoder: PioEncoder<'static, PIO0, 0>) -> ! {
    loop {
        COUNTERS.step_command(steps(decoder.read().await));
    }
}

#[embassy_executor::task]
async fn feedback_decoder_task(mut decoder: PioEncoder<'static, PIO0, 1>) -> ! {
    loop {
        COUNTERS.step_feedback(steps(decoder.read().await));
    }
}

#[embassy_executor::task]
async fn console_rx_task(mut rx: UartRx<'static, Async>) -> ! {
    let mut byte = [0u8; 1];
    loop {
        match rx.read(&mut byte).await {
            Ok(()) => LINES.push_bytes(&byte),
            Err(err) => defmt::warn!("console rx: {}", err),
        }
    }
}

struct Board {
    tx: UartTx<'static, Async>,
    enable: Input<'static>,
    led: Output<'static>,
}

impl core::fmt::Write for Board {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.tx
            .blocking_write(s.as_bytes())
            .map_err(|_| core::fmt::Error)
    }
}

impl SupervisorIo for Board {
    fn take_line(&mut self) -> Option<Result<Line>> {
        LINES.take()
    }

    fn line_pending(&mut self) -> bool {
        LINES.is_ready()
    }

    fn enable_input(&mut self) -> bool {
        self.enable.is_high()
    }

    fn set_status_indicator(&mut self, on: bool) {
        self.led.set_level(Level::from(on));
    }
}

#[entry]
fn main() -> ! {
    let err = match inner_main() {
        Ok(never) => match never {},
        Err(err) => err,
    };
    panic!("{err}");
}

fn inner_main() -> Result<core::convert::Infallible> {
    let p = embassy_rp::init(Default::default());

    // Power stage first, so the outputs are known-off before anything else runs.
    let pwm = Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_16, p.PIN_17, PwmConfig::default());
    let bridge = HBridgePwm::new(pwm, H_BRIDGE_SLICE);

    let Pio {
        mut common,
        sm0,
        sm1,
        ..
    } = Pio::new(p.PIO0, Irqs);
    let program = PioEncoderProgram::new(&mut common);
    let command_decoder = PioEncoder::new(&mut common, sm0, p.PIN_2, p.PIN_3, &program);
    let feedback_decoder = PioEncoder::new(&mut common, sm1, p.PIN_4, p.PIN_5, &program);

    let uart = Uart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        UartConfig::default(),
    );
    let (tx, rx) = uart.split();

    interrupt::SWI_IRQ_1.set_priority(Priority::P1);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.spawn(servo_tick_task(bridge)).map_err(Error::TaskSpawn)?;
    high.spawn(countdown_tick_task()).map_err(Error::TaskSpawn)?;
    high.spawn(command_decoder_task(command_decoder))
        .map_err(Error::TaskSpawn)?;
    high.spawn(feedback_decoder_task(feedback_decoder))
        .map_err(Error::TaskSpawn)?;

    interrupt::SWI_IRQ_0.set_priority(Priority::P2);
    let low = EXECUTOR_LOW.start(interrupt::SWI_IRQ_0);
    low.spawn(console_rx_task(rx)).map_err(Error::TaskSpawn)?;

    let [parameter_block] = FlashArray::<1>::new(p.FLASH)?;
    let board = Board {
        tx,
        enable: Input::new(p.PIN_15, Pull::Down),
        led: Output::new(p.PIN_25, Level::Low),
    };
    let delay = CountdownDelay::new(&COUNTDOWN);
    let store = ParameterStore::new(QuiescedStorage::new(parameter_block, || {
        cut_off_outputs(H_BRIDGE_SLICE);
    }));
    Supervisor::new(&AXIS, &COUNTERS, store, delay, board).run()
}
