//! Assembles received bytes into command lines.
//!
//! The receive path pushes bytes one at a time. A carriage return or line feed completes the
//! line; until the foreground takes it, further bytes are ignored. A line that overflows
//! [`LINE_CAPACITY`] is handed over as [`Error::LineTooLong`] rather than as a truncated line.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::String;

use crate::config::LINE_CAPACITY;
use crate::{Error, Result};

/// One received line.
pub type Line = String<LINE_CAPACITY>;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

/// Line assembly state.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: Line,
    ready: bool,
    overflowed: bool,
}

impl LineBuffer {
    /// Empty and waiting for input.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            line: String::new(),
            ready: false,
            overflowed: false,
        }
    }

    /// Feed one received byte.
    pub fn push_byte(&mut self, byte: u8) {
        if self.ready {
            return;
        }
        match byte {
            b'\r' | b'\n' => {
                // A bare terminator (the LF of a CRLF pair, say) is not a line.
                if !self.line.is_empty() || self.overflowed {
                    self.ready = true;
                }
            }
            BACKSPACE | DELETE => {
                self.line.pop();
            }
            byte if byte.is_ascii() && !byte.is_ascii_control() => {
                if self.line.push(char::from(byte)).is_err() {
                    self.overflowed = true;
                }
            }
            _ => {}
        }
    }

    /// Whether a complete line is waiting.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Remove and return the completed line, if any.
    ///
    /// # Errors
    ///
    /// The inner result is [`Error::LineTooLong`] when the line overflowed the buffer.
    pub fn take(&mut self) -> Option<Result<Line>> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        let line = core::mem::take(&mut self.line);
        if core::mem::take(&mut self.overflowed) {
            Some(Err(Error::LineTooLong))
        } else {
            Some(Ok(line))
        }
    }
}

/// A [`LineBuffer`] shared between the receive interrupt and the foreground.
pub struct SharedLineBuffer(Mutex<CriticalSectionRawMutex, RefCell<LineBuffer>>);

impl SharedLineBuffer {
    /// Empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(Mutex::new(RefCell::new(LineBuffer::new())))
    }

    /// Feed one received byte.
    pub fn push_byte(&self, byte: u8) {
        self.0.lock(|cell| cell.borrow_mut().push_byte(byte));
    }

    /// Feed a run of received bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.0.lock(|cell| {
            let mut buffer = cell.borrow_mut();
            for &byte in bytes {
                buffer.push_byte(byte);
            }
        });
    }

    /// Whether a complete line is waiting.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.lock(|cell| cell.borrow().is_ready())
    }

    /// Remove and return the completed line, if any. See [`LineBuffer::take`].
    pub fn take(&self) -> Option<Result<Line>> {
        self.0.lock(|cell| cell.borrow_mut().take())
    }
}

impl Default for SharedLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
