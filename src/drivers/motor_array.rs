//! Stepper motor array (28BYJ-48 + ULN2003 on MCP23017 nibbles).
//!
//! Maps logical motor ids to expander nibbles, drives the half-step
//! excitation sequence and keeps the per-motor dispense budget.
//!
//! ## Dispense budget
//!
//! Every successful limited [`step`](MotorArray::step) consumes exactly one
//! call, however many whole steps it moved. Once `call_count` reaches
//! `max_calls` further limited steps fail with
//! [`Error::LimitReached`] before any bus traffic. Only homing ignores the
//! ceiling and only homing resets the count.
//!
//! ## Coil safety contract
//!
//! A winding must never be left energised. Every step holds an
//! [`EnergisedCoils`] guard that writes the zero pattern on the way out,
//! on success, on a bus error and on unwind.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::SystemConfig;
use crate::drivers::expander::{ADDR_BOARD1, ADDR_BOARD2, ExpanderBus, NibbleLocation, Port};
use crate::error::{ConfigFault, Error, HardwareFault, Result};

/// Half-step excitation table. Do not reorder: the two-coil entries sit
/// between the single-coil ones and the motor only turns cleanly this way.
pub const HALF_STEP_SEQUENCE: [u8; 8] = [
    0b0001, 0b0011, 0b0010, 0b0110, 0b0100, 0b1100, 0b1000, 0b1001,
];

pub const HALFSTEPS_PER_WHOLESTEP: u32 = 2;

/// Six motors, three per expander.
pub const MAX_MOTORS: usize = 6;

/// Motor id → coil nibble. Motors on an absent expander are dropped at
/// startup.
pub const MOTOR_LAYOUT: [(u8, NibbleLocation); MAX_MOTORS] = [
    (1, NibbleLocation::new(ADDR_BOARD1, Port::A, 0)),
    (2, NibbleLocation::new(ADDR_BOARD1, Port::A, 4)),
    (3, NibbleLocation::new(ADDR_BOARD1, Port::B, 0)),
    (4, NibbleLocation::new(ADDR_BOARD2, Port::A, 0)),
    (5, NibbleLocation::new(ADDR_BOARD2, Port::A, 4)),
    (6, NibbleLocation::new(ADDR_BOARD2, Port::B, 0)),
];

// ───────────────────────────────────────────────────────────────
// Direction
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `+1`: walks the table downward (counter-clockwise on the carousel).
    Forward,
    /// `-1`: walks the table upward.
    Reverse,
}

impl Direction {
    /// Any non-negative value is forward.
    pub fn from_sign(sign: i32) -> Self {
        if sign >= 0 {
            Self::Forward
        } else {
            Self::Reverse
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }

    /// Next index into [`HALF_STEP_SEQUENCE`].
    pub fn advance(self, index: usize) -> usize {
        let len = HALF_STEP_SEQUENCE.len();
        match self {
            Self::Forward => (index + len - 1) % len,
            Self::Reverse => (index + 1) % len,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

/// The motor-related subset of [`SystemConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSettings {
    pub wholesteps_per_dispense: u16,
    pub slots_per_revolution: u16,
    pub max_calls: u8,
    pub half_step_delay_us: u32,
}

impl MotorSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            wholesteps_per_dispense: config.wholesteps_per_dispense,
            slots_per_revolution: config.slots_per_revolution,
            max_calls: config.max_calls_per_motor,
            half_step_delay_us: config.half_step_delay_us,
        }
    }

    /// One full carousel revolution.
    pub fn homing_wholesteps(&self) -> u32 {
        self.slots_per_revolution as u32 * self.wholesteps_per_dispense as u32
    }
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

// ───────────────────────────────────────────────────────────────
// Motor
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motor {
    id: u8,
    location: NibbleLocation,
    /// Index of the last pattern written.
    seq_index: usize,
    call_count: u8,
}

impl Motor {
    fn new(id: u8, location: NibbleLocation) -> Self {
        Self {
            id,
            location,
            seq_index: 0,
            call_count: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn location(&self) -> NibbleLocation {
        self.location
    }

    pub fn seq_index(&self) -> usize {
        self.seq_index
    }

    pub fn call_count(&self) -> u8 {
        self.call_count
    }
}

/// Per-motor view for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotorStatus {
    pub motor_id: u8,
    pub present: bool,
    pub call_count: Option<u8>,
    pub remaining_calls: Option<u8>,
}

// ───────────────────────────────────────────────────────────────
// MotorArray
// ───────────────────────────────────────────────────────────────

pub struct MotorArray<I2C, D> {
    bus: ExpanderBus<I2C>,
    delay: D,
    motors: heapless::Vec<Motor, MAX_MOTORS>,
    settings: MotorSettings,
}

impl<I2C: I2c, D: DelayNs> MotorArray<I2C, D> {
    /// Detect expanders and build the active motor map.
    ///
    /// Never fails: missing expanders only shrink the map.
    pub fn new(i2c: I2C, delay: D, settings: MotorSettings) -> Self {
        let mut bus = ExpanderBus::new(i2c);
        let present = bus.detect();

        let motors: heapless::Vec<Motor, MAX_MOTORS> = MOTOR_LAYOUT
            .iter()
            .filter(|(_, loc)| present.contains(&loc.address))
            .map(|&(id, loc)| Motor::new(id, loc))
            .collect();

        let ids: heapless::Vec<u8, MAX_MOTORS> = motors.iter().map(Motor::id).collect();
        info!("MotorArray: active motors {:?}", ids.as_slice());
        if motors.is_empty() {
            warn!("MotorArray: no expander answered; every motor is unavailable");
        }

        Self {
            bus,
            delay,
            motors,
            settings,
        }
    }

    pub fn settings(&self) -> &MotorSettings {
        &self.settings
    }

    /// Ids of motors whose expander is present, ascending.
    pub fn active_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.motors.iter().map(Motor::id)
    }

    pub fn motor(&self, motor_id: u8) -> Result<&Motor> {
        let idx = self.index_of(motor_id)?;
        Ok(&self.motors[idx])
    }

    /// Rotate `whole_steps` in `direction`.
    ///
    /// With `enforce_limits`, fails with [`Error::LimitReached`] (and no bus
    /// writes) once the budget is spent, and consumes one call on success.
    pub fn step(
        &mut self,
        motor_id: u8,
        direction: Direction,
        whole_steps: u32,
        enforce_limits: bool,
    ) -> Result<()> {
        let idx = self.index_of(motor_id)?;
        let max_calls = self.settings.max_calls;

        if enforce_limits && self.motors[idx].call_count >= max_calls {
            warn!("MotorArray: motor {} refused, {} calls used", motor_id, max_calls);
            return Err(Error::LimitReached {
                motor: motor_id,
                max_calls,
            });
        }

        let ticks = whole_steps.saturating_mul(HALFSTEPS_PER_WHOLESTEP);
        let delay_us = self.settings.half_step_delay_us;
        debug!(
            "MotorArray: motor {} {:?} {} whole steps ({} ticks)",
            motor_id, direction, whole_steps, ticks
        );

        let motor = &mut self.motors[idx];
        let mut coils = EnergisedCoils::new(&mut self.bus, motor.location);

        let mut driven = Ok(());
        for _ in 0..ticks {
            let next = direction.advance(motor.seq_index);
            if let Err(e) = coils.write(HALF_STEP_SEQUENCE[next]) {
                driven = Err(e);
                break;
            }
            motor.seq_index = next;
            self.delay.delay_us(delay_us);
        }

        let released = coils.release();
        if let Err(e) = driven {
            error!("MotorArray: motor {} bus fault mid-move: {}", motor_id, e);
            return Err(e.into());
        }
        released?;

        if enforce_limits {
            motor.call_count += 1;
        }
        Ok(())
    }

    /// One dispense move. Returns the calls left afterwards.
    pub fn dispense(&mut self, motor_id: u8, direction: Direction) -> Result<u8> {
        let steps = self.settings.wholesteps_per_dispense as u32;
        self.step(motor_id, direction, steps, true)?;
        self.remaining_calls(motor_id)
    }

    pub fn call_count(&self, motor_id: u8) -> Result<u8> {
        Ok(self.motor(motor_id)?.call_count)
    }

    pub fn remaining_calls(&self, motor_id: u8) -> Result<u8> {
        let used = self.call_count(motor_id)?;
        Ok(self.settings.max_calls.saturating_sub(used))
    }

    pub fn reset_call_count(&mut self, motor_id: u8) -> Result<()> {
        let idx = self.index_of(motor_id)?;
        self.motors[idx].call_count = 0;
        Ok(())
    }

    pub fn reset_all_call_counts(&mut self) {
        for m in &mut self.motors {
            m.call_count = 0;
        }
    }

    /// De-energise every coil on every present expander.
    pub fn coils_off_all(&mut self) -> core::result::Result<(), HardwareFault> {
        self.bus.all_off()
    }

    /// Status of every motor in the layout, present or not.
    pub fn status(&self) -> Vec<MotorStatus> {
        MOTOR_LAYOUT
            .iter()
            .map(|&(id, _)| match self.motors.iter().find(|m| m.id == id) {
                Some(m) => MotorStatus {
                    motor_id: id,
                    present: true,
                    call_count: Some(m.call_count),
                    remaining_calls: Some(self.settings.max_calls.saturating_sub(m.call_count)),
                },
                None => MotorStatus {
                    motor_id: id,
                    present: false,
                    call_count: None,
                    remaining_calls: None,
                },
            })
            .collect()
    }

    /// Tear down, handing the bus and delay back.
    pub fn release(self) -> (I2C, D) {
        (self.bus.release(), self.delay)
    }

    fn index_of(&self, motor_id: u8) -> Result<usize> {
        if let Some(idx) = self.motors.iter().position(|m| m.id == motor_id) {
            return Ok(idx);
        }
        if MOTOR_LAYOUT.iter().any(|&(id, _)| id == motor_id) {
            Err(ConfigFault::MotorAbsent(motor_id).into())
        } else {
            Err(ConfigFault::UnknownMotor(motor_id).into())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Coil guard
// ───────────────────────────────────────────────────────────────

/// Holds one motor's nibble for the duration of a move and writes the
/// zero pattern when released or dropped.
struct EnergisedCoils<'a, I2C: I2c> {
    bus: &'a mut ExpanderBus<I2C>,
    location: NibbleLocation,
    released: bool,
}

impl<'a, I2C: I2c> EnergisedCoils<'a, I2C> {
    fn new(bus: &'a mut ExpanderBus<I2C>, location: NibbleLocation) -> Self {
        Self {
            bus,
            location,
            released: false,
        }
    }

    fn write(&mut self, pattern: u8) -> core::result::Result<(), HardwareFault> {
        self.bus.write_nibble(self.location, pattern)
    }

    fn release(mut self) -> core::result::Result<(), HardwareFault> {
        self.released = true;
        self.bus.write_nibble(self.location, 0)
    }
}

impl<I2C: I2c> Drop for EnergisedCoils<'_, I2C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.bus.write_nibble(self.location, 0) {
            error!("MotorArray: coils at {:?} may still be energised: {}", self.location, e);
        }
    }
}
