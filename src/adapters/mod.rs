//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements         | Connects to                  |
//! |------------------|--------------------|------------------------------|
//! | `clock`          | Clock              | local wall clock (chrono)    |
//! | `config_file`    | ConfigPort         | JSON file                    |
//! | `schedule_store` | ScheduleStore      | JSON file / in-memory `Vec`  |
//! | `sim`            | I2c, OutputPin,    | simulated bus and pins       |
//! |                  | DelayNs            |                              |
//! | `linux`          | I2c, OutputPin,    | `/dev/i2c-N`, sysfs GPIO     |
//! |                  | DelayNs            | (feature `linux`)            |

pub mod clock;
pub mod config_file;
#[cfg(feature = "linux")]
pub mod linux;
pub mod schedule_store;
pub mod sim;
pub(super) mod utils;
