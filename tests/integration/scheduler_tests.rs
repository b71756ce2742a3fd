//! Integration tests for AlertScheduler → HardwareController → alarms.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::mock_hw::{
    controller_with, small_config, time, CountingAlarm, FixedClock, MockBus, NoDelay,
    PanickyTrigger, RecordingTrigger, SharedStore,
};

use pillsync::adapters::schedule_store::JsonScheduleStore;
use pillsync::app::ports::{ScheduleStore, StoreError};
use pillsync::drivers::expander::ADDR_BOARD1;
use pillsync::error::{Error, ErrorKind, SchedulerFault};
use pillsync::scheduler::{AlertScheduler, DoseStatus, ScheduleEntry, SchedulerSettings, TimeOfDay};

fn entry(id: i64, at: &str) -> ScheduleEntry {
    ScheduleEntry::active(id, 3, "Atorvastatin", at.parse::<TimeOfDay>().unwrap())
}

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        interval: Duration::from_secs(60),
        backoff: Duration::from_millis(20),
        tolerance_minutes: 15,
        alarm_duration: Duration::from_secs(30),
    }
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn due_dose_sounds_every_actuator_through_the_controller() {
    let piezo = CountingAlarm::new("piezo");
    let indicator = CountingAlarm::new("indicator");
    let controller = Arc::new(
        controller_with(&MockBus::new(&[ADDR_BOARD1]), NoDelay, &small_config())
            .with_alarm(piezo.clone())
            .with_alarm(indicator.clone()),
    );
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    let mut s = AlertScheduler::new(store.clone(), FixedClock::at(8, 10), controller, settings());

    assert_eq!(s.run_once().unwrap(), vec![1]);
    assert_eq!((piezo.count(), indicator.count()), (1, 1));

    let stored = &store.entries()[0];
    assert_eq!(stored.status, DoseStatus::Dispensed);
    assert_eq!(stored.last_dispensed, Some(time(8, 10)));
}

#[test]
fn dispensed_dose_does_not_retrigger_later_in_window() {
    let trigger = Arc::new(RecordingTrigger::default());
    let clock = FixedClock::at(8, 10);
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    let mut s = AlertScheduler::new(store.clone(), clock.clone(), Arc::clone(&trigger), settings());

    s.run_once().unwrap();
    clock.set(8, 20);
    assert!(s.run_once().unwrap().is_empty());
    assert_eq!(trigger.count(), 1);
    assert_eq!(trigger.durations.lock().unwrap()[0], Duration::from_secs(30));
}

#[test]
fn dose_outside_window_stays_active() {
    let trigger = Arc::new(RecordingTrigger::default());
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    let mut s = AlertScheduler::new(store.clone(), FixedClock::at(8, 20), Arc::clone(&trigger), settings());

    assert!(s.run_once().unwrap().is_empty());
    assert_eq!(trigger.count(), 0);
    assert_eq!(store.entries()[0].status, DoseStatus::Active);
}

#[test]
fn failed_status_update_leaves_dose_active_and_reports_fault() {
    let trigger = Arc::new(RecordingTrigger::default());
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    store.fail_mark.store(1, std::sync::atomic::Ordering::SeqCst);
    let mut s = AlertScheduler::new(store.clone(), FixedClock::at(8, 5), Arc::clone(&trigger), settings());

    let err = s.run_once().unwrap_err();
    assert_eq!(err, Error::Scheduler(SchedulerFault::Store(StoreError::IoError)));
    assert_eq!(err.kind(), ErrorKind::Scheduler);
    assert_eq!(store.entries()[0].status, DoseStatus::Active);

    // next pass alarms again and commits
    assert_eq!(s.run_once().unwrap(), vec![1]);
    assert_eq!(trigger.count(), 2);
}

#[test]
fn background_loop_backs_off_after_failure_and_stops_promptly() {
    let trigger = Arc::new(RecordingTrigger::default());
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    store.fail_query.store(2, std::sync::atomic::Ordering::SeqCst);
    let scheduler = AlertScheduler::new(store.clone(), FixedClock::at(8, 0), Arc::clone(&trigger), settings());

    let handle = scheduler.spawn().unwrap();
    // two failed passes 20 ms apart, then the third succeeds
    assert!(wait_for(|| trigger.count() == 1));
    assert!(wait_for(|| store.entries()[0].status == DoseStatus::Dispensed));

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(1), "stop waited out the interval");
}

#[test]
fn background_loop_survives_a_panicking_pass() {
    let trigger = Arc::new(PanickyTrigger::new(1));
    let store = SharedStore::new(vec![entry(1, "08:00")]);
    let scheduler = AlertScheduler::new(store.clone(), FixedClock::at(8, 0), Arc::clone(&trigger), settings());

    let handle = scheduler.spawn().unwrap();
    // first pass unwinds before marking; the retry after backoff commits
    assert!(wait_for(|| trigger.calls() == 2), "no pass ran after the panic");
    assert!(wait_for(|| store.entries()[0].status == DoseStatus::Dispensed));
    handle.stop();
}

#[test]
fn json_store_round_trip_through_scheduler() {
    let path = std::env::temp_dir().join(format!("pillsync-sched-it-{}.json", std::process::id()));
    let mut seed = JsonScheduleStore::new(&path);
    seed.save(&[entry(7, "21:00"), entry(8, "09:00")]).unwrap();
    assert_eq!(seed.query_active().unwrap().len(), 2);

    let trigger = Arc::new(RecordingTrigger::default());
    let mut s = AlertScheduler::new(
        JsonScheduleStore::new(&path),
        FixedClock::at(20, 50),
        Arc::clone(&trigger),
        settings(),
    );
    assert_eq!(s.run_once().unwrap(), vec![7]);

    let on_disk = JsonScheduleStore::new(&path).load().unwrap();
    assert_eq!(on_disk[0].status, DoseStatus::Dispensed);
    assert_eq!(on_disk[1].status, DoseStatus::Active);
    std::fs::remove_file(&path).unwrap();
}
