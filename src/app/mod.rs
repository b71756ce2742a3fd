//! Application core.
//!
//! The [`controller::HardwareController`] is the single entry point for
//! every hardware-touching request. Everything outside the process
//! (alarm actuators, the dose schedule, the clock, the config file) is
//! reached through the **port traits** in [`ports`].

pub mod controller;
pub mod ports;
