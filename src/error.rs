//! Unified error types for the PillSync controller.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! controller boundary can turn any failure into a structured result.
//! All variants are `Copy`; bus failures are carried as the portable
//! `embedded-hal` error kinds rather than driver-specific types.

use core::fmt;

use embedded_hal::{digital, i2c};

use crate::app::ports::StoreError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unknown or hardware-absent motor, or hardware disabled. Never retried.
    Config(ConfigFault),
    /// The motor has used its dispense budget; it must be homed first.
    LimitReached { motor: u8, max_calls: u8 },
    /// Bus or pin communication failed mid-operation.
    Hardware(HardwareFault),
    /// A scheduler iteration failed; the loop backs off and continues.
    Scheduler(SchedulerFault),
}

/// Coarse classification used by callers that only need to branch on the
/// recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    LimitReached,
    Hardware,
    Scheduler,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::LimitReached { .. } => ErrorKind::LimitReached,
            Self::Hardware(_) => ErrorKind::Hardware,
            Self::Scheduler(_) => ErrorKind::Scheduler,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::LimitReached { motor, max_calls } => write!(
                f,
                "motor {motor} has reached its limit of {max_calls} calls; home it first"
            ),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Scheduler(e) => write!(f, "scheduler: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFault {
    /// Motor id outside the layout table.
    UnknownMotor(u8),
    /// Motor id is valid but its expander did not answer at startup.
    MotorAbsent(u8),
    /// The bus could not be opened; the controller runs without hardware.
    HardwareDisabled,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMotor(id) => write!(f, "unknown motor id {id}"),
            Self::MotorAbsent(id) => {
                write!(f, "motor {id} not available on detected hardware")
            }
            Self::HardwareDisabled => write!(f, "hardware disabled"),
        }
    }
}

impl From<ConfigFault> for Error {
    fn from(e: ConfigFault) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    /// I2C transaction with an expander failed.
    Bus { address: u8, kind: i2c::ErrorKind },
    /// GPIO write to an alarm actuator failed.
    Pin(digital::ErrorKind),
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus { address, kind } => {
                write!(f, "I2C error at 0x{address:02X}: {kind}")
            }
            Self::Pin(kind) => write!(f, "GPIO error: {kind:?}"),
        }
    }
}

impl From<HardwareFault> for Error {
    fn from(e: HardwareFault) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Scheduler faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerFault {
    /// The schedule store could not be read or updated.
    Store(StoreError),
}

impl fmt::Display for SchedulerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "schedule store: {e}"),
        }
    }
}

impl From<SchedulerFault> for Error {
    fn from(e: SchedulerFault) -> Self {
        Self::Scheduler(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Scheduler(SchedulerFault::Store(e))
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
