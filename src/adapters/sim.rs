//! Simulated peripherals for hosts without the dispenser hardware.
//!
//! Selected when the `linux` feature is off. The bus acknowledges a
//! configurable set of expander addresses, pins log their transitions
//! and delays really sleep, so the daemon behaves (and takes as long)
//! as it would on the device.

use core::convert::Infallible;
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::trace;

/// An I2C bus on which only `present` addresses answer.
#[derive(Debug, Clone)]
pub struct SimI2c {
    present: Vec<u8>,
}

impl SimI2c {
    pub fn new(present: &[u8]) -> Self {
        Self {
            present: present.to_vec(),
        }
    }
}

impl ErrorType for SimI2c {
    type Error = ErrorKind;
}

impl I2c for SimI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        if !self.present.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => trace!("SimI2c: 0x{:02X} <- {:02X?}", address, bytes),
                Operation::Read(buf) => buf.fill(0),
            }
        }
        Ok(())
    }
}

/// An output pin that only logs.
#[derive(Debug)]
pub struct SimPin {
    label: &'static str,
    high: bool,
}

impl SimPin {
    pub fn new(label: &'static str) -> Self {
        Self { label, high: false }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl PinErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            trace!("SimPin: {} low", self.label);
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            trace!("SimPin: {} high", self.label);
        }
        self.high = true;
        Ok(())
    }
}

/// Blocking delay on `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
