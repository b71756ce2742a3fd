//! Dose alert scheduler.
//!
//! Polls the persisted dose schedule on a fixed cadence and raises the
//! alarm for every Active entry whose time of day is within the tolerance
//! window. The scheduler never touches motors; it reaches the hardware
//! only through an [`AlarmTrigger`].
//!
//! ```text
//! ┌──────────────┐  now   ┌────────────────┐  query_active   ┌───────────────┐
//! │    Clock     │──────▶│ AlertScheduler │◀──────────────▶│ ScheduleStore │
//! └──────────────┘        │   run_once()   │  mark_dispensed └───────────────┘
//!                         └───────┬────────┘
//!                                 │ trigger_alarm(duration)
//!                                 ▼
//!                          HardwareController
//! ```
//!
//! An entry is marked Dispensed only after the alarm call has returned,
//! so the store is never ahead of the hardware. A failed or panicking
//! iteration is logged and retried after the shorter backoff; the loop
//! only ends on [`SchedulerHandle::stop`].

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::app::ports::{AlarmTrigger, Clock, ScheduleStore};
use crate::config::SystemConfig;
use crate::error::Result;

const MINUTES_PER_DAY: u16 = 24 * 60;

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// Hour and minute, no date. `"HH:MM"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Minutes since midnight, `0..1440`.
    pub fn minute_of_day(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    /// Plain absolute difference in minutes. Does not wrap at midnight:
    /// 23:55 and 00:05 are 1430 minutes apart.
    pub fn minutes_between(self, other: Self) -> u16 {
        self.minute_of_day().abs_diff(other.minute_of_day())
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        // chrono guarantees hour < 24, minute < 60
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeOfDayError(String);

impl fmt::Display for ParseTimeOfDayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day {:?}, expected HH:MM", self.0)
    }
}

impl std::error::Error for ParseTimeOfDayError {}

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let bad = || ParseTimeOfDayError(s.to_owned());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        let hour = h.parse().map_err(|_| bad())?;
        let minute = m.parse().map_err(|_| bad())?;
        Self::new(hour, minute).ok_or_else(bad)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeOfDayError;

    fn try_from(s: String) -> core::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoseStatus {
    Active,
    Dispensed,
}

/// One persisted dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub prescription_id: i64,
    pub user_id: i64,
    pub name: String,
    pub time_of_day: TimeOfDay,
    pub status: DoseStatus,
    #[serde(default)]
    pub last_dispensed: Option<NaiveDateTime>,
}

impl ScheduleEntry {
    /// A fresh Active entry.
    pub fn active(prescription_id: i64, user_id: i64, name: &str, time_of_day: TimeOfDay) -> Self {
        Self {
            prescription_id,
            user_id,
            name: name.to_owned(),
            time_of_day,
            status: DoseStatus::Active,
            last_dispensed: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// The scheduler subset of [`SystemConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub backoff: Duration,
    pub tolerance_minutes: u16,
    pub alarm_duration: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.scheduler_interval_secs as u64),
            backoff: Duration::from_secs(config.scheduler_backoff_secs as u64),
            tolerance_minutes: config.dose_tolerance_minutes,
            alarm_duration: config.alarm_duration(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

/// Background dose scheduler.
///
/// Owns its own store handle; the request side never shares it.
pub struct AlertScheduler<S, C, A: ?Sized> {
    store: S,
    clock: C,
    alarm: Arc<A>,
    settings: SchedulerSettings,
}

impl<S, C, A> AlertScheduler<S, C, A>
where
    S: ScheduleStore,
    C: Clock,
    A: AlarmTrigger + ?Sized,
{
    pub fn new(store: S, clock: C, alarm: Arc<A>, settings: SchedulerSettings) -> Self {
        debug_assert!(settings.tolerance_minutes < MINUTES_PER_DAY);
        Self {
            store,
            clock,
            alarm,
            settings,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// One polling pass. Returns the prescription ids marked Dispensed.
    ///
    /// Stops at the first store failure; entries already handled in this
    /// pass stay Dispensed, the failing one stays Active.
    pub fn run_once(&mut self) -> Result<Vec<i64>> {
        let now = self.clock.now();
        let now_tod = TimeOfDay::from(now.time());
        let entries = self.store.query_active()?;

        let mut dispensed = Vec::new();
        for entry in entries {
            if entry.status != DoseStatus::Active {
                continue;
            }
            let diff = now_tod.minutes_between(entry.time_of_day);
            if diff > self.settings.tolerance_minutes {
                continue;
            }

            info!(
                "Scheduler: '{}' (prescription {}, user {}) due at {}, now {} ({} min off)",
                entry.name, entry.prescription_id, entry.user_id, entry.time_of_day, now_tod, diff
            );
            self.alarm.trigger_alarm(self.settings.alarm_duration);

            self.store.mark_dispensed(entry.prescription_id, now)?;
            dispensed.push(entry.prescription_id);
        }

        if dispensed.is_empty() {
            debug!("Scheduler: nothing due at {}", now_tod);
        }
        Ok(dispensed)
    }

    /// Poll until `shutdown` fires or its sender is dropped.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        info!(
            "Scheduler: started (every {:?}, ±{} min)",
            self.settings.interval, self.settings.tolerance_minutes
        );
        loop {
            let wait = match panic::catch_unwind(AssertUnwindSafe(|| self.run_once())) {
                Ok(Ok(_)) => self.settings.interval,
                Ok(Err(e)) => {
                    error!(
                        "Scheduler: iteration failed: {}; retrying in {:?}",
                        e, self.settings.backoff
                    );
                    self.settings.backoff
                }
                Err(payload) => {
                    error!(
                        "Scheduler: iteration panicked: {}; retrying in {:?}",
                        panic_message(payload.as_ref()),
                        self.settings.backoff
                    );
                    self.settings.backoff
                }
            };
            match shutdown.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Scheduler: stopped");
    }
}

impl<S, C, A> AlertScheduler<S, C, A>
where
    S: ScheduleStore + Send + 'static,
    C: Clock + Send + 'static,
    A: AlarmTrigger + Send + Sync + ?Sized + 'static,
{
    /// Move the scheduler onto its own thread.
    pub fn spawn(mut self) -> std::io::Result<SchedulerHandle> {
        let (tx, rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("alert-scheduler".into())
            .spawn(move || self.run(&rx))?;
        Ok(SchedulerHandle {
            shutdown: tx,
            join: Some(join),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

/// Owner of a running scheduler thread.
///
/// Dropping the handle without [`stop`](Self::stop) also ends the loop
/// (the channel disconnects), but does not wait for it.
pub struct SchedulerHandle {
    shutdown: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Block until the loop exits without signalling it. The sender stays
    /// alive meanwhile, so this returns only if the thread dies.
    pub fn wait(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Scheduler: thread panicked");
            }
        }
    }

    /// Signal the loop and wait for it to exit. A pass in progress,
    /// including a sounding alarm, finishes first.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Scheduler: thread panicked");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
