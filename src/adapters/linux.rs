//! Raspberry Pi peripherals through Linux character devices.
//!
//! - Expander bus: `/dev/i2c-N` via `I2cdev`.
//! - Piezo / indicator: sysfs GPIO, exported and driven low on open.
//! - Step timing: `linux_embedded_hal::Delay`.

use anyhow::{Context, Result};
use linux_embedded_hal::sysfs_gpio::Direction;
use linux_embedded_hal::{Delay, I2cdev, SysfsPin};
use log::info;

pub type LinuxI2c = I2cdev;
pub type LinuxPin = SysfsPin;
pub type LinuxDelay = Delay;

/// Open the I2C character device the expanders hang off.
pub fn open_i2c(path: &str) -> Result<LinuxI2c> {
    let bus = I2cdev::new(path).with_context(|| format!("opening I2C bus {path}"))?;
    info!("Linux: I2C bus {} open", path);
    Ok(bus)
}

/// Export `gpio` and configure it as an output, initially low.
pub fn open_output_pin(gpio: u32) -> Result<LinuxPin> {
    let pin = SysfsPin::new(gpio as u64);
    pin.export().with_context(|| format!("exporting GPIO {gpio}"))?;
    pin.set_direction(Direction::Low)
        .with_context(|| format!("configuring GPIO {gpio} as output"))?;
    info!("Linux: GPIO {} ready", gpio);
    Ok(pin)
}

pub fn delay() -> LinuxDelay {
    Delay
}
