//! Mock hardware for integration tests.
//!
//! Records every expander register write so tests can assert on the full
//! bus history without a real I2C adapter. All mocks are `Send` so the
//! controller can be shared across threads exactly as in the daemon.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::ErrorKind as PinErrorKind;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use pillsync::app::controller::HardwareController;
use pillsync::app::ports::{AlarmPort, AlarmTrigger, Clock, ScheduleStore, StoreError};
use pillsync::config::SystemConfig;
use pillsync::drivers::motor_array::{MotorArray, MotorSettings};
use pillsync::error::HardwareFault;
use pillsync::scheduler::ScheduleEntry;
use pillsync::adapters::schedule_store::MemoryScheduleStore;

// ── Recording I2C bus ─────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BusLog {
    /// `(address, register, value)` for every two-byte write.
    pub writes: Vec<(u8, u8, u8)>,
    /// Fail the register write with this index (once).
    pub fail_at: Option<usize>,
}

#[derive(Clone)]
pub struct MockBus {
    present: Vec<u8>,
    log: Arc<Mutex<BusLog>>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new(present: &[u8]) -> Self {
        Self {
            present: present.to_vec(),
            log: Arc::new(Mutex::new(BusLog::default())),
        }
    }

    pub fn log(&self) -> MutexGuard<'_, BusLog> {
        self.log.lock().unwrap()
    }

    pub fn writes(&self) -> Vec<(u8, u8, u8)> {
        self.log().writes.clone()
    }

    pub fn clear(&self) {
        self.log().writes.clear();
    }

    /// Fail the `n`-th register write from now (0 = the next one).
    pub fn fail_write_in(&self, n: usize) {
        let mut log = self.log();
        log.fail_at = Some(log.writes.len() + n);
    }
}

impl ErrorType for MockBus {
    type Error = ErrorKind;
}

impl I2c for MockBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        if !self.present.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        let mut log = self.log.lock().unwrap();
        for op in operations {
            if let Operation::Write([register, value]) = op {
                if log.fail_at == Some(log.writes.len()) {
                    log.fail_at = None;
                    return Err(ErrorKind::Bus);
                }
                log.writes.push((address, *register, *value));
            }
        }
        Ok(())
    }
}

// ── Delays ────────────────────────────────────────────────────

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Yields on every tick so concurrent callers get a chance to interleave.
pub struct YieldDelay;

impl DelayNs for YieldDelay {
    fn delay_ns(&mut self, _ns: u32) {
        thread::yield_now();
    }
}

// ── Controller builders ───────────────────────────────────────

pub fn small_config() -> SystemConfig {
    SystemConfig {
        wholesteps_per_dispense: 4,
        slots_per_revolution: 7,
        max_calls_per_motor: 3,
        half_step_delay_us: 1,
        ..SystemConfig::default()
    }
}

#[allow(dead_code)]
pub fn controller_with<D: DelayNs>(
    bus: &MockBus,
    delay: D,
    config: &SystemConfig,
) -> HardwareController<MockBus, D> {
    let array = MotorArray::new(bus.clone(), delay, MotorSettings::from_config(config));
    HardwareController::new(array, config)
}

// ── Alarm actuators ───────────────────────────────────────────

/// Counts triggers; optionally fails every time.
#[derive(Clone)]
pub struct CountingAlarm {
    pub name: &'static str,
    pub triggers: Arc<AtomicUsize>,
    pub fail: bool,
}

#[allow(dead_code)]
impl CountingAlarm {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            triggers: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn count(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

impl AlarmPort for CountingAlarm {
    fn name(&self) -> &'static str {
        self.name
    }

    fn trigger(&mut self, _duration: Duration) -> Result<(), HardwareFault> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(HardwareFault::Pin(PinErrorKind::Other))
        } else {
            Ok(())
        }
    }
}

/// Waits (bounded) until `expected` actuators are inside `trigger` at the
/// same time, and records whether they all met.
#[derive(Clone)]
pub struct RendezvousAlarm {
    arrived: Arc<(Mutex<usize>, Condvar)>,
    expected: usize,
    pub met: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl RendezvousAlarm {
    pub fn group(expected: usize) -> Vec<Self> {
        let arrived = Arc::new((Mutex::new(0), Condvar::new()));
        let met = Arc::new(AtomicUsize::new(0));
        (0..expected)
            .map(|_| Self {
                arrived: Arc::clone(&arrived),
                expected,
                met: Arc::clone(&met),
            })
            .collect()
    }
}

impl AlarmPort for RendezvousAlarm {
    fn name(&self) -> &'static str {
        "rendezvous"
    }

    fn trigger(&mut self, _duration: Duration) -> Result<(), HardwareFault> {
        let (lock, cvar) = &*self.arrived;
        let mut n = lock.lock().unwrap();
        *n += 1;
        cvar.notify_all();
        let (n, timeout) = cvar
            .wait_timeout_while(n, Duration::from_secs(2), |n| *n < self.expected)
            .unwrap();
        drop(n);
        if !timeout.timed_out() {
            self.met.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// `AlarmTrigger` that only records durations.
#[derive(Default)]
pub struct RecordingTrigger {
    pub durations: Mutex<Vec<Duration>>,
}

#[allow(dead_code)]
impl RecordingTrigger {
    pub fn count(&self) -> usize {
        self.durations.lock().unwrap().len()
    }
}

impl AlarmTrigger for RecordingTrigger {
    fn trigger_alarm(&self, duration: Duration) {
        self.durations.lock().unwrap().push(duration);
    }
}

/// `AlarmTrigger` that panics on its first `panics` calls, then records.
pub struct PanickyTrigger {
    panics: AtomicUsize,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl PanickyTrigger {
    pub fn new(panics: usize) -> Self {
        Self {
            panics: AtomicUsize::new(panics),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AlarmTrigger for PanickyTrigger {
    fn trigger_alarm(&self, _duration: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.panics.load(Ordering::SeqCst);
        if left > 0 {
            self.panics.store(left - 1, Ordering::SeqCst);
            panic!("actuator thread could not start");
        }
    }
}

// ── Clock ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FixedClock(Arc<Mutex<NaiveDateTime>>);

#[allow(dead_code)]
impl FixedClock {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self(Arc::new(Mutex::new(time(hour, minute))))
    }

    pub fn set(&self, hour: u32, minute: u32) {
        *self.0.lock().unwrap() = time(hour, minute);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

pub fn time(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap()
}

// ── Schedule store with failure injection ─────────────────────

#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryScheduleStore>>,
    pub fail_query: Arc<AtomicUsize>,
    pub fail_mark: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl SharedStore {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryScheduleStore::new(entries))),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.inner.lock().unwrap().entries().to_vec()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ScheduleStore for SharedStore {
    fn query_active(&mut self) -> Result<Vec<ScheduleEntry>, StoreError> {
        if Self::take_failure(&self.fail_query) {
            return Err(StoreError::IoError);
        }
        self.inner.lock().unwrap().query_active()
    }

    fn mark_dispensed(&mut self, prescription_id: i64, at: NaiveDateTime) -> Result<(), StoreError> {
        if Self::take_failure(&self.fail_mark) {
            return Err(StoreError::IoError);
        }
        self.inner.lock().unwrap().mark_dispensed(prescription_id, at)
    }
}
