//! MCP23017 I/O expander bus.
//!
//! Up to two expanders share one I2C bus. Each exposes two 8-bit ports;
//! every port is an output and each 4-bit half (nibble) drives the coils
//! of one stepper.
//!
//! ## Presence
//!
//! [`ExpanderBus::detect`] probes every candidate address once at
//! startup. A chip that NAKs the probe, or fails its register set-up, is
//! absent for the lifetime of the process. Presence is never rechecked.
//!
//! ## Output latches
//!
//! Two motors can share one output latch (GPA0–3 / GPA4–7). The bus keeps
//! a shadow copy of every latch and merges nibble writes into it, so
//! de-energising one motor never disturbs its neighbour.

use embedded_hal::i2c::{Error as _, I2c};
use log::{debug, info, warn};

use crate::error::HardwareFault;

/// Expander with A0–A2 strapped low (board 1).
pub const ADDR_BOARD1: u8 = 0x20;
/// Expander with A0 strapped high (board 2, optional).
pub const ADDR_BOARD2: u8 = 0x21;
/// Addresses probed at startup, in order.
pub const CANDIDATE_ADDRESSES: [u8; 2] = [ADDR_BOARD1, ADDR_BOARD2];

/// MCP23017 register map (IOCON.BANK = 0).
pub mod reg {
    pub const IODIRA: u8 = 0x00;
    pub const IODIRB: u8 = 0x01;
    pub const OLATA: u8 = 0x14;
    pub const OLATB: u8 = 0x15;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A,
    B,
}

impl Port {
    pub const fn output_register(self) -> u8 {
        match self {
            Self::A => reg::OLATA,
            Self::B => reg::OLATB,
        }
    }

    pub const fn direction_register(self) -> u8 {
        match self {
            Self::A => reg::IODIRA,
            Self::B => reg::IODIRB,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Where one motor's four coil lines live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NibbleLocation {
    pub address: u8,
    pub port: Port,
    /// 0 for the low nibble, 4 for the high nibble.
    pub shift: u8,
}

impl NibbleLocation {
    pub const fn new(address: u8, port: Port, shift: u8) -> Self {
        Self {
            address,
            port,
            shift,
        }
    }

    const fn mask(self) -> u8 {
        0x0F << self.shift
    }
}

/// One expander chip and whether it answered at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpanderChip {
    pub address: u8,
    pub present: bool,
}

/// Register-level access to the expanders on one I2C bus.
pub struct ExpanderBus<I2C> {
    i2c: I2C,
    chips: [ExpanderChip; CANDIDATE_ADDRESSES.len()],
    /// Shadow of each output latch, indexed `[chip][port]`.
    latches: [[u8; 2]; CANDIDATE_ADDRESSES.len()],
}

impl<I2C: I2c> ExpanderBus<I2C> {
    /// Wrap the bus. No traffic until [`detect`](Self::detect).
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            chips: CANDIDATE_ADDRESSES.map(|address| ExpanderChip {
                address,
                present: false,
            }),
            latches: [[0; 2]; CANDIDATE_ADDRESSES.len()],
        }
    }

    /// Probe every candidate address, configure the ones that answer and
    /// return the set of present addresses.
    ///
    /// A communication error at any point degrades that chip to absent.
    pub fn detect(&mut self) -> heapless::Vec<u8, 2> {
        let mut present = heapless::Vec::new();

        for i in 0..self.chips.len() {
            let address = self.chips[i].address;

            // Probe: a lone register-pointer byte, harmless on the MCP23017.
            if let Err(e) = self.i2c.write(address, &[reg::IODIRA]) {
                debug!("Expander 0x{:02X}: no answer ({:?})", address, e.kind());
                self.chips[i].present = false;
                continue;
            }

            match self.configure(address) {
                Ok(()) => {
                    self.chips[i].present = true;
                    self.latches[i] = [0; 2];
                    let _ = present.push(address);
                }
                Err(e) => {
                    warn!("Expander 0x{:02X}: set-up failed ({}), treating as absent", address, e);
                    self.chips[i].present = false;
                }
            }
        }

        info!("ExpanderBus: detected {:02X?}", present.as_slice());
        present
    }

    /// Whether `address` answered at startup.
    pub fn is_present(&self, address: u8) -> bool {
        self.chips
            .iter()
            .any(|c| c.address == address && c.present)
    }

    /// Snapshot of every candidate chip.
    pub fn chips(&self) -> &[ExpanderChip] {
        &self.chips
    }

    /// Write a 4-bit coil pattern into one half of an output latch,
    /// leaving the other half as last written.
    pub fn write_nibble(&mut self, loc: NibbleLocation, pattern: u8) -> Result<(), HardwareFault> {
        let nibble = (pattern & 0x0F) << loc.shift;
        let value = match self.chip_index(loc.address) {
            Some(chip) => (self.latches[chip][loc.port.index()] & !loc.mask()) | nibble,
            None => nibble,
        };

        self.write_reg(loc.address, loc.port.output_register(), value)?;

        if let Some(chip) = self.chip_index(loc.address) {
            self.latches[chip][loc.port.index()] = value;
        }
        Ok(())
    }

    /// Zero every output latch on every present chip.
    ///
    /// Keeps going after a failure so one bad chip cannot leave the other
    /// energised; the first error is returned.
    pub fn all_off(&mut self) -> Result<(), HardwareFault> {
        let mut first_err = None;
        for i in 0..self.chips.len() {
            if !self.chips[i].present {
                continue;
            }
            let address = self.chips[i].address;
            for port in [Port::A, Port::B] {
                match self.write_reg(address, port.output_register(), 0x00) {
                    Ok(()) => self.latches[i][port.index()] = 0,
                    Err(e) if first_err.is_none() => first_err = Some(e),
                    Err(_) => {}
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Give the underlying bus back (used by tests and shutdown).
    pub fn release(self) -> I2C {
        self.i2c
    }

    // ── Internal ──────────────────────────────────────────────

    /// All pins to outputs, all latches low.
    fn configure(&mut self, address: u8) -> Result<(), HardwareFault> {
        for port in [Port::A, Port::B] {
            self.write_reg(address, port.direction_register(), 0x00)?;
        }
        for port in [Port::A, Port::B] {
            self.write_reg(address, port.output_register(), 0x00)?;
        }
        Ok(())
    }

    fn write_reg(&mut self, address: u8, register: u8, value: u8) -> Result<(), HardwareFault> {
        self.i2c
            .write(address, &[register, value])
            .map_err(|e| HardwareFault::Bus {
                address,
                kind: e.kind(),
            })
    }

    fn chip_index(&self, address: u8) -> Option<usize> {
        self.chips.iter().position(|c| c.address == address)
    }
}
