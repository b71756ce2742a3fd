//! System configuration parameters
//!
//! All tunable parameters for the dispenser. Values are loaded through
//! [`ConfigPort`](crate::app::ports::ConfigPort) from a JSON file; any
//! field missing from the file takes its default.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Longest alarm any caller may request.
pub const MAX_ALARM_DURATION: Duration = Duration::from_secs(600);

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Bus ---
    /// I2C character device the expanders hang off.
    pub i2c_bus: String,

    // --- Motors ---
    /// Delay between half-step ticks (microseconds). Tunes torque vs speed.
    pub half_step_delay_us: u32,
    /// Whole steps rotated by one dispense call.
    pub wholesteps_per_dispense: u16,
    /// Dispense slots per full revolution.
    pub slots_per_revolution: u16,
    /// Dispense calls allowed between homings.
    pub max_calls_per_motor: u8,
    /// Motors homed by `home_all`, in ascending order.
    pub homing_motor_ids: Vec<u8>,
    /// Homing rotation direction (+1 / -1).
    pub homing_direction: i32,

    // --- Scheduler ---
    /// Poll cadence of the dose scheduler (seconds).
    pub scheduler_interval_secs: u32,
    /// Sleep after a failed scheduler iteration (seconds).
    pub scheduler_backoff_secs: u32,
    /// A dose is due when |now - time_of_day| is within this many minutes.
    pub dose_tolerance_minutes: u16,

    // --- Alarm ---
    /// How long a dose alarm sounds (seconds).
    pub alarm_duration_secs: f32,
    /// BCM pin driving the piezo.
    pub piezo_gpio: u32,
    /// BCM pin driving the visual indicator.
    pub indicator_gpio: u32,

    // --- Storage ---
    /// JSON file holding the dose schedule.
    pub schedule_path: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Bus
            i2c_bus: "/dev/i2c-1".into(),

            // Motors (28BYJ-48 geared steppers)
            half_step_delay_us: 3_000,
            wholesteps_per_dispense: 558,
            slots_per_revolution: 7,
            max_calls_per_motor: 7,
            homing_motor_ids: vec![1, 2, 3],
            homing_direction: 1,

            // Scheduler
            scheduler_interval_secs: 60,
            scheduler_backoff_secs: 10,
            dose_tolerance_minutes: 15,

            // Alarm
            alarm_duration_secs: 30.0,
            piezo_gpio: 12,
            indicator_gpio: 18,

            // Storage
            schedule_path: "schedule.json".into(),
        }
    }
}

impl SystemConfig {
    /// Range-check every field. Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.i2c_bus.is_empty() {
            return Err(ConfigError::ValidationFailed("i2c_bus must not be empty"));
        }
        if self.half_step_delay_us == 0 || self.half_step_delay_us > 100_000 {
            return Err(ConfigError::ValidationFailed(
                "half_step_delay_us must be 1..=100000",
            ));
        }
        if self.wholesteps_per_dispense == 0 {
            return Err(ConfigError::ValidationFailed(
                "wholesteps_per_dispense must be > 0",
            ));
        }
        if self.slots_per_revolution == 0 {
            return Err(ConfigError::ValidationFailed(
                "slots_per_revolution must be > 0",
            ));
        }
        if self.max_calls_per_motor == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_calls_per_motor must be > 0",
            ));
        }
        if self.homing_motor_ids.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "homing_motor_ids must not be empty",
            ));
        }
        if self.homing_motor_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ValidationFailed(
                "homing_motor_ids must be strictly ascending",
            ));
        }
        if self.scheduler_interval_secs == 0 || self.scheduler_backoff_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "scheduler intervals must be > 0",
            ));
        }
        if self.dose_tolerance_minutes >= 12 * 60 {
            return Err(ConfigError::ValidationFailed(
                "dose_tolerance_minutes must be under 12 hours",
            ));
        }
        if !(0.0..=MAX_ALARM_DURATION.as_secs_f32()).contains(&self.alarm_duration_secs) {
            return Err(ConfigError::ValidationFailed(
                "alarm_duration_secs must be 0–600",
            ));
        }
        Ok(())
    }

    /// Alarm length as a [`Duration`]. Zero if the field is out of range.
    pub fn alarm_duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.alarm_duration_secs).unwrap_or_default()
    }
}
