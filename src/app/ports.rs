//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HardwareController / AlertScheduler
//! ```
//!
//! Alarm actuators, the dose schedule, the wall clock and the config file
//! are all external collaborators. The domain core reaches them only
//! through these traits, so every piece can be exercised with mocks.

use core::time::Duration;

use chrono::NaiveDateTime;

use crate::config::SystemConfig;
use crate::error::HardwareFault;
use crate::scheduler::ScheduleEntry;

// ───────────────────────────────────────────────────────────────
// Alarm actuator port (driven adapter: domain → piezo / indicator)
// ───────────────────────────────────────────────────────────────

/// A physical alert device. `trigger` blocks for the full duration and
/// must leave the output de-energised when it returns, even on error.
pub trait AlarmPort: Send {
    /// Short label for logs ("piezo", "indicator").
    fn name(&self) -> &'static str;

    /// Run the alert pattern for `duration`.
    fn trigger(&mut self, duration: Duration) -> Result<(), HardwareFault>;
}

// ───────────────────────────────────────────────────────────────
// Alarm trigger (decouples the scheduler from the controller)
// ───────────────────────────────────────────────────────────────

/// What the [`AlertScheduler`](crate::scheduler::AlertScheduler) calls when
/// a dose is due. Implemented by
/// [`HardwareController`](super::controller::HardwareController); tests
/// substitute a recorder.
pub trait AlarmTrigger {
    /// Blocking; returns once every actuator has finished.
    fn trigger_alarm(&self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Schedule store port (driven adapter: scheduler ↔ persisted doses)
// ───────────────────────────────────────────────────────────────

/// Persisted dose schedule.
///
/// The scheduler owns its own handle; nothing here is shared with the
/// request-handling side, so no transaction spans both.
pub trait ScheduleStore {
    /// All entries whose status is `Active`.
    fn query_active(&mut self) -> Result<Vec<ScheduleEntry>, StoreError>;

    /// Transition one entry Active → Dispensed and record `at`.
    /// A no-op for entries that are already Dispensed.
    fn mark_dispensed(
        &mut self,
        prescription_id: i64,
        at: NaiveDateTime,
    ) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Local wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting. Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load configuration. Returns [`ConfigError::NotFound`] if nothing is
    /// stored yet; callers fall back to [`SystemConfig::default()`].
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found (first boot).
    NotFound,
    /// Stored config failed to deserialise.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`ScheduleStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// No entry with the requested prescription id.
    NotFound,
    /// Stored schedule failed to deserialise.
    Corrupted,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "prescription not found"),
            Self::Corrupted => write!(f, "schedule corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StoreError {}
