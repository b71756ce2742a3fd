//! Software homing.
//!
//! There is no end-stop: homing rotates one full carousel revolution
//! (`slots_per_revolution × wholesteps_per_dispense`) so the slot wheel
//! is back on its reference, then refreshes the dispense budget.
//! Motors are homed one after another; the bus is shared.

use std::collections::BTreeMap;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::drivers::motor_array::{Direction, MotorArray};
use crate::error::Result;

/// Home one motor, ignoring its call ceiling, then reset its count to 0.
///
/// The count is only reset once the full revolution completed; after a
/// bus fault the wheel position is unknown and the budget stays spent.
pub fn home<I2C: I2c, D: DelayNs>(
    array: &mut MotorArray<I2C, D>,
    motor_id: u8,
    direction: Direction,
) -> Result<()> {
    let steps = array.settings().homing_wholesteps();
    info!("Homing: motor {} ({} whole steps, {:?})", motor_id, steps, direction);

    array.step(motor_id, direction, steps, false)?;
    array.reset_call_count(motor_id)?;

    info!("Homing: motor {} at reference", motor_id);
    Ok(())
}

/// Home `motor_ids` in ascending order, sequentially.
///
/// Failures (absent hardware, bus faults) are reported as `false`; this
/// never returns early.
pub fn home_all<I2C: I2c, D: DelayNs>(
    array: &mut MotorArray<I2C, D>,
    motor_ids: &[u8],
    direction: Direction,
) -> BTreeMap<u8, bool> {
    let mut ids = motor_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .map(|id| {
            let ok = match home(array, id, direction) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Homing: motor {} failed: {}", id, e);
                    false
                }
            };
            (id, ok)
        })
        .collect()
}
