//! Dispenser hardware drivers: expander bus, stepper array, homing and
//! alarm actuators.

pub mod alarm;
pub mod expander;
pub mod homing;
pub mod motor_array;
