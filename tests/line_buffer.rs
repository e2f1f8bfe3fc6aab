#![allow(missing_docs)]
//! Host-level tests for command line assembly and the countdown delay.

use axis_servo::config::LINE_CAPACITY;
use axis_servo::countdown::{CountdownDelay, TickCountdown, TickDelay};
use axis_servo::Error;
use axis_servo::line_buffer::{LineBuffer, SharedLineBuffer};

fn feed(buffer: &mut LineBuffer, bytes: &[u8]) {
    for &byte in bytes {
        buffer.push_byte(byte);
    }
}

fn text(buffer: &mut LineBuffer) -> Option<String> {
    buffer
        .take()
        .map(|line| line.expect("line fits").as_str().to_owned())
}

#[test]
fn carriage_return_completes_a_line() {
    let mut buffer = LineBuffer::new();
    feed(&mut buffer, b"p2.5");
    assert!(!buffer.is_ready());
    assert_eq!(None, text(&mut buffer));

    buffer.push_byte(b'\r');
    assert!(buffer.is_ready());
    assert_eq!(Some("p2.5"), text(&mut buffer).as_deref());
    assert!(!buffer.is_ready());
}

#[test]
fn crlf_yields_one_line() {
    let mut buffer = LineBuffer::new();
    feed(&mut buffer, b"l\r\n");
    assert_eq!(Some("l"), text(&mut buffer).as_deref());
    buffer.push_byte(b'\n');
    assert!(!buffer.is_ready());
    feed(&mut buffer, b"e\n");
    assert_eq!(Some("e"), text(&mut buffer).as_deref());
}

#[test]
fn input_is_ignored_until_the_line_is_taken() {
    let mut buffer = LineBuffer::new();
    feed(&mut buffer, b"s\rp1\r");
    assert_eq!(Some("s"), text(&mut buffer).as_deref());
    assert_eq!(None, text(&mut buffer));
}

#[test]
fn backspace_edits_the_line() {
    let mut buffer = LineBuffer::new();
    feed(&mut buffer, b"p9\x081.5\x7f0\r");
    assert_eq!(Some("p1.0"), text(&mut buffer).as_deref());
}

#[test]
fn overlong_line_is_handed_over_as_an_error() {
    let mut buffer = LineBuffer::new();
    buffer.push_byte(b'p');
    for _ in 0..LINE_CAPACITY * 2 {
        buffer.push_byte(b'9');
    }
    buffer.push_byte(b'\r');
    assert!(buffer.is_ready());
    assert_eq!(Some(Err(Error::LineTooLong)), buffer.take());

    // The next line starts clean.
    feed(&mut buffer, b"l\r");
    assert_eq!(Some("l"), text(&mut buffer).as_deref());
}

#[test]
fn line_of_exactly_capacity_is_accepted() {
    let mut buffer = LineBuffer::new();
    for _ in 0..LINE_CAPACITY {
        buffer.push_byte(b'1');
    }
    buffer.push_byte(b'\n');
    assert_eq!(Some(LINE_CAPACITY), text(&mut buffer).map(|line| line.len()));
}

#[test]
fn shared_buffer_accepts_bursts() {
    let shared = SharedLineBuffer::new();
    shared.push_bytes(b"x30\r");
    assert!(shared.is_ready());
    assert_eq!(Some("x30"), shared.take().and_then(Result::ok).as_deref());
    assert!(!shared.is_ready());
}

#[test]
fn countdown_stops_at_zero() {
    let countdown = TickCountdown::new();
    countdown.start(2);
    countdown.tick();
    assert_eq!(1, countdown.remaining());
    countdown.tick();
    countdown.tick();
    assert_eq!(0, countdown.remaining());
}

#[test]
fn delay_completes_when_the_countdown_runs_out() {
    let countdown = TickCountdown::new();
    let mut delay = CountdownDelay::new(&countdown);
    // The cancel check stands in for the tick interrupt.
    let completed = delay.delay_ticks(5, || {
        countdown.tick();
        false
    });
    assert!(completed);
    assert_eq!(0, countdown.remaining());
}

#[test]
fn delay_can_be_cancelled() {
    let countdown = TickCountdown::new();
    let mut delay = CountdownDelay::new(&countdown);
    let mut polls = 0;
    let completed = delay.delay_ticks(1_000, || {
        polls += 1;
        polls == 3
    });
    assert!(!completed);
    assert_eq!(1_000, countdown.remaining());
}
