//! Wall-clock adapter.
//!
//! Dose times are local times of day, so the scheduler reads the local
//! clock rather than UTC.

use chrono::{Local, NaiveDateTime};

use crate::app::ports::Clock;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
