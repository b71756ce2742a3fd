//! Piezo and visual-indicator alarm drivers.
//!
//! Both actuators are a single GPIO switched in groups of pulses until
//! the requested duration has elapsed:
//!
//! ```text
//!  piezo      ▁▇▁▇▁▇▁▁▁▁▁▇▁▇▁▇▁▁▁▁▁ …   3 × (150 ms on, 100 ms off), 500 ms pause
//!  indicator  ▁▇▇▁▇▇▁▁▁▁▁▁▇▇▁▇▇▁▁▁ …   2 × (220 ms on, 120 ms off), 600 ms pause
//! ```
//!
//! Elapsed time is counted from the delays actually issued, so the pattern
//! is exact under a mocked delay. The pin is always driven low on return.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, OutputPin};
use log::{debug, warn};

use crate::app::ports::AlarmPort;
use crate::error::HardwareFault;

/// Timing of one pulse group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePattern {
    pub pulses_per_group: u8,
    pub on_ms: u32,
    pub off_ms: u32,
    pub group_pause_ms: u32,
}

impl PulsePattern {
    pub const PIEZO: Self = Self {
        pulses_per_group: 3,
        on_ms: 150,
        off_ms: 100,
        group_pause_ms: 500,
    };

    pub const INDICATOR: Self = Self {
        pulses_per_group: 2,
        on_ms: 220,
        off_ms: 120,
        group_pause_ms: 600,
    };

    /// Length of one group including its trailing pause.
    pub fn group_ms(&self) -> u64 {
        self.pulses_per_group as u64 * (self.on_ms as u64 + self.off_ms as u64)
            + self.group_pause_ms as u64
    }
}

/// A GPIO-driven alarm actuator.
pub struct PulseAlarm<P, D> {
    name: &'static str,
    pin: P,
    delay: D,
    pattern: PulsePattern,
}

impl<P: OutputPin, D: DelayNs> PulseAlarm<P, D> {
    pub fn new(name: &'static str, pin: P, delay: D, pattern: PulsePattern) -> Self {
        Self {
            name,
            pin,
            delay,
            pattern,
        }
    }

    /// Piezo buzzer (active, on/off only).
    pub fn piezo(pin: P, delay: D) -> Self {
        Self::new("piezo", pin, delay, PulsePattern::PIEZO)
    }

    /// Visual indicator, flashed in step with the piezo.
    pub fn indicator(pin: P, delay: D) -> Self {
        Self::new("indicator", pin, delay, PulsePattern::INDICATOR)
    }

    pub fn pattern(&self) -> PulsePattern {
        self.pattern
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }

    fn run(&mut self, budget_ms: u64) -> Result<(), P::Error> {
        let p = self.pattern;
        let mut elapsed_ms = 0u64;
        while elapsed_ms < budget_ms {
            for _ in 0..p.pulses_per_group {
                self.pin.set_high()?;
                self.delay.delay_ms(p.on_ms);
                self.pin.set_low()?;
                self.delay.delay_ms(p.off_ms);
            }
            self.delay.delay_ms(p.group_pause_ms);
            elapsed_ms += p.group_ms();
        }
        Ok(())
    }
}

impl<P, D> AlarmPort for PulseAlarm<P, D>
where
    P: OutputPin + Send,
    D: DelayNs + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn trigger(&mut self, duration: Duration) -> Result<(), HardwareFault> {
        debug!("Alarm: {} for {:?}", self.name, duration);
        let budget_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        let ran = self.run(budget_ms);
        let off = self.pin.set_low();

        if let Err(e) = &off {
            warn!("Alarm: {} could not be switched off: {:?}", self.name, e.kind());
        }
        ran.and(off).map_err(|e| HardwareFault::Pin(e.kind()))
    }
}
