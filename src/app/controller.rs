//! Hardware controller, the single owner of the motor array.
//!
//! [`HardwareController`] is shared (behind an `Arc`) between the request
//! handlers and the [`AlertScheduler`](crate::scheduler::AlertScheduler).
//! It serialises all motor traffic and turns every failure into a
//! structured result, so a bus fault can never unwind into a caller.
//!
//! ```text
//!  requests ──┐                     ┌──────────────────────────┐
//!             ├──▶ dispense/home ──▶│ Mutex<Option<MotorArray>>│──▶ I2C
//!  scheduler ─┤                     └──────────────────────────┘
//!             └──▶ trigger_alarm ──▶  Mutex<alarms>  ──▶ piezo ∥ indicator
//! ```
//!
//! ## Locking
//!
//! One lock covers the whole bus, not one per motor: a dispense on motor 2
//! never interleaves with homing on motor 1. Alarms have their own lock,
//! so an alarm may sound while a motor turns. Moves are not cancellable.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{MAX_ALARM_DURATION, SystemConfig};
use crate::drivers::homing;
use crate::drivers::motor_array::{Direction, MOTOR_LAYOUT, MotorArray, MotorStatus};
use crate::error::{ConfigFault, Error, ErrorKind, Result};

use super::ports::{AlarmPort, AlarmTrigger};

// ───────────────────────────────────────────────────────────────
// Request / result shapes
// ───────────────────────────────────────────────────────────────

/// One dispense request as it arrives from the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseRequest {
    pub user_id: Option<i64>,
    pub motor_id: u8,
    /// +1 / -1; any non-negative value is forward.
    #[serde(default = "forward")]
    pub direction: i32,
}

fn forward() -> i32 {
    1
}

impl DispenseRequest {
    pub fn new(user_id: Option<i64>, motor_id: u8, direction: i32) -> Self {
        Self {
            user_id,
            motor_id,
            direction,
        }
    }
}

/// Outcome of a dispense. Serialises to the front end's
/// `{success, error}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispenseResult {
    pub motor_id: u8,
    pub success: bool,
    pub error: Option<String>,
    /// Calls left before the motor must be homed (success only).
    pub remaining_calls: Option<u8>,
    #[serde(skip)]
    pub kind: Option<ErrorKind>,
}

impl DispenseResult {
    fn ok(motor_id: u8, remaining: u8) -> Self {
        Self {
            motor_id,
            success: true,
            error: None,
            remaining_calls: Some(remaining),
            kind: None,
        }
    }

    fn failed(motor_id: u8, err: Error) -> Self {
        Self {
            motor_id,
            success: false,
            error: Some(err.to_string()),
            remaining_calls: None,
            kind: Some(err.kind()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// HardwareController
// ───────────────────────────────────────────────────────────────

pub struct HardwareController<I2C, D> {
    /// `None` when the bus could not be opened (disabled mode).
    motors: Mutex<Option<MotorArray<I2C, D>>>,
    alarms: Mutex<Vec<Box<dyn AlarmPort>>>,
    homing_ids: Vec<u8>,
}

impl<I2C: I2c, D: DelayNs> HardwareController<I2C, D> {
    /// Take ownership of an initialised motor array.
    pub fn new(array: MotorArray<I2C, D>, config: &SystemConfig) -> Self {
        Self::build(Some(array), config)
    }

    /// No hardware: every motor call returns a structured failure while
    /// the rest of the process keeps running.
    pub fn disabled(config: &SystemConfig) -> Self {
        warn!("HardwareController: running with hardware disabled");
        Self::build(None, config)
    }

    fn build(array: Option<MotorArray<I2C, D>>, config: &SystemConfig) -> Self {
        Self {
            motors: Mutex::new(array),
            alarms: Mutex::new(Vec::new()),
            homing_ids: config.homing_motor_ids.clone(),
        }
    }

    /// Register an alarm actuator. All registered actuators sound together.
    #[must_use]
    pub fn with_alarm(self, alarm: impl AlarmPort + 'static) -> Self {
        self.lock_alarms().push(Box::new(alarm));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_motors().is_some()
    }

    // ── Motor operations ──────────────────────────────────────

    /// Dispense one slot. Never panics or propagates a hardware error.
    pub fn dispense(&self, request: DispenseRequest) -> DispenseResult {
        let motor_id = request.motor_id;
        let direction = Direction::from_sign(request.direction);

        let outcome = self.with_array(|array| array.dispense(motor_id, direction));
        match outcome {
            Ok(remaining) => {
                info!(
                    "Dispense: user={:?} motor={} dir={:+} remaining={}",
                    request.user_id,
                    motor_id,
                    direction.sign(),
                    remaining
                );
                DispenseResult::ok(motor_id, remaining)
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Hardware => error!("Dispense: motor {} faulted: {}", motor_id, e),
                    _ => warn!("Dispense: motor {} refused: {}", motor_id, e),
                }
                DispenseResult::failed(motor_id, e)
            }
        }
    }

    /// Home one motor.
    pub fn home(&self, motor_id: u8, direction: Direction) -> Result<()> {
        self.with_array(|array| homing::home(array, motor_id, direction))
    }

    /// Home every configured motor in ascending order.
    ///
    /// In disabled mode every configured id reports `false` without any
    /// hardware access.
    pub fn home_all(&self, direction: Direction) -> BTreeMap<u8, bool> {
        let mut guard = self.lock_motors();
        match guard.as_mut() {
            Some(array) => homing::home_all(array, &self.homing_ids, direction),
            None => {
                warn!("HardwareController: home_all skipped, hardware disabled");
                self.homing_ids.iter().map(|&id| (id, false)).collect()
            }
        }
    }

    pub fn remaining_calls(&self, motor_id: u8) -> Result<u8> {
        self.with_array(|array| array.remaining_calls(motor_id))
    }

    pub fn reset_call_count(&self, motor_id: u8) -> Result<()> {
        self.with_array(|array| array.reset_call_count(motor_id))
    }

    pub fn reset_all_call_counts(&self) -> Result<()> {
        self.with_array(|array| {
            array.reset_all_call_counts();
            Ok(())
        })
    }

    /// Presence and budget of every motor in the layout.
    pub fn motor_status(&self) -> Vec<MotorStatus> {
        match self.lock_motors().as_ref() {
            Some(array) => array.status(),
            None => MOTOR_LAYOUT
                .iter()
                .map(|&(motor_id, _)| MotorStatus {
                    motor_id,
                    present: false,
                    call_count: None,
                    remaining_calls: None,
                })
                .collect(),
        }
    }

    /// De-energise every coil. Called on shutdown.
    pub fn shutdown(&self) -> Result<()> {
        self.with_array(|array| array.coils_off_all().map_err(Error::from))
    }

    // ── Alarm ─────────────────────────────────────────────────

    /// Sound every alarm actuator concurrently. Blocks for `duration`,
    /// capped at [`MAX_ALARM_DURATION`].
    ///
    /// Actuator failures are logged, not returned; one failing actuator
    /// does not stop the others.
    pub fn trigger_alarm(&self, duration: Duration) {
        let duration = if duration > MAX_ALARM_DURATION {
            warn!("Alarm: {:?} requested, capped at {:?}", duration, MAX_ALARM_DURATION);
            MAX_ALARM_DURATION
        } else {
            duration
        };
        let mut alarms = self.lock_alarms();
        if alarms.is_empty() {
            warn!("Alarm: no actuators registered");
            return;
        }
        info!("Alarm: sounding {} actuator(s) for {:?}", alarms.len(), duration);

        thread::scope(|s| {
            let mut running = Vec::with_capacity(alarms.len());
            for alarm in alarms.iter_mut() {
                let name = alarm.name();
                let spawned = thread::Builder::new()
                    .name(format!("alarm-{name}"))
                    .spawn_scoped(s, move || alarm.trigger(duration));
                match spawned {
                    Ok(handle) => running.push((name, handle)),
                    Err(e) => error!("Alarm: {} not started: {}", name, e),
                }
            }

            for (name, handle) in running {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Alarm: {} failed: {}", name, e),
                    Err(_) => error!("Alarm: {} panicked", name),
                }
            }
        });
    }

    /// Pre-empt a running alarm. Alarms are not interruptible yet, so
    /// this only logs.
    pub fn clear_alarm(&self) {
        debug!("Alarm: clear requested (no-op)");
    }

    // ── Internal ──────────────────────────────────────────────

    fn with_array<T>(&self, f: impl FnOnce(&mut MotorArray<I2C, D>) -> Result<T>) -> Result<T> {
        let mut guard = self.lock_motors();
        match guard.as_mut() {
            Some(array) => f(array),
            None => Err(ConfigFault::HardwareDisabled.into()),
        }
    }

    /// A caller that panicked mid-move must not disable the hardware for
    /// everyone else; the coil guard has already de-energised on unwind.
    fn lock_motors(&self) -> MutexGuard<'_, Option<MotorArray<I2C, D>>> {
        self.motors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_alarms(&self) -> MutexGuard<'_, Vec<Box<dyn AlarmPort>>> {
        self.alarms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<I2C: I2c, D: DelayNs> AlarmTrigger for HardwareController<I2C, D> {
    fn trigger_alarm(&self, duration: Duration) {
        HardwareController::trigger_alarm(self, duration);
    }
}
