//! PillSync daemon entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  I2C bus (linux / sim)   piezo + indicator pins   SystemClock  │
//! │  JsonConfigFile          JsonScheduleStore                     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────────────┐   ┌──────────────────────┐   │
//! │  │ HardwareController (Arc)     │◀──│ AlertScheduler thread │   │
//! │  │ MotorArray · Homing · Alarms │   └──────────────────────┘   │
//! │  └──────────────▲───────────────┘                              │
//! │                 │                                              │
//! │          request console (stdin → JSON)                        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `pillsync [config.json]`. Requests are read one per line from
//! stdin; each is answered with one JSON line on stdout. Only `quit`
//! stops the daemon: when stdin closes (e.g. `/dev/null` under a service
//! manager) the scheduler keeps running until the process is signalled.

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{error, info, warn};
use serde_json::json;

use pillsync::adapters::clock::SystemClock;
use pillsync::adapters::config_file::JsonConfigFile;
use pillsync::adapters::schedule_store::JsonScheduleStore;
use pillsync::app::controller::{DispenseRequest, HardwareController};
use pillsync::app::ports::{ConfigError, ConfigPort};
use pillsync::config::{MAX_ALARM_DURATION, SystemConfig};
use pillsync::drivers::alarm::PulseAlarm;
use pillsync::drivers::motor_array::{Direction, MotorArray, MotorSettings};
use pillsync::scheduler::{AlertScheduler, SchedulerSettings};

const DEFAULT_CONFIG_PATH: &str = "pillsync.json";

// ── Platform selection ────────────────────────────────────────

#[cfg(feature = "linux")]
mod platform {
    use anyhow::Result;
    use pillsync::adapters::linux::{self, LinuxDelay, LinuxI2c, LinuxPin};
    use pillsync::config::SystemConfig;

    pub type Bus = LinuxI2c;
    pub type Pin = LinuxPin;
    pub type Delay = LinuxDelay;

    pub fn open_bus(config: &SystemConfig) -> Result<Bus> {
        linux::open_i2c(&config.i2c_bus)
    }

    pub fn open_pin(gpio: u32, _label: &'static str) -> Result<Pin> {
        linux::open_output_pin(gpio)
    }

    pub fn delay() -> Delay {
        linux::delay()
    }
}

#[cfg(not(feature = "linux"))]
mod platform {
    use anyhow::Result;
    use log::info;
    use pillsync::adapters::sim::{SimI2c, SimPin, StdDelay};
    use pillsync::config::SystemConfig;
    use pillsync::drivers::expander::CANDIDATE_ADDRESSES;

    pub type Bus = SimI2c;
    pub type Pin = SimPin;
    pub type Delay = StdDelay;

    pub fn open_bus(config: &SystemConfig) -> Result<Bus> {
        info!("Platform: simulated bus in place of {}", config.i2c_bus);
        Ok(SimI2c::new(&CANDIDATE_ADDRESSES))
    }

    pub fn open_pin(_gpio: u32, label: &'static str) -> Result<Pin> {
        Ok(SimPin::new(label))
    }

    pub fn delay() -> Delay {
        StdDelay
    }
}

type Controller = HardwareController<platform::Bus, platform::Delay>;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("PillSync v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Config ─────────────────────────────────────────────
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    let config = load_config(&JsonConfigFile::new(&config_path));

    // ── 2. Hardware (degrades, never aborts) ──────────────────
    let controller = Arc::new(bring_up(&config));

    // ── 3. Scheduler thread ───────────────────────────────────
    let scheduler = AlertScheduler::new(
        JsonScheduleStore::new(&config.schedule_path),
        SystemClock,
        Arc::clone(&controller),
        SchedulerSettings::from_config(&config),
    );
    let scheduler = scheduler.spawn().context("starting scheduler thread")?;

    // ── 4. Request console ────────────────────────────────────
    info!("System ready. Reading requests from stdin.");
    let homing_direction = Direction::from_sign(config.homing_direction);
    let served = serve_console(&controller, homing_direction, io::stdin().lock(), io::stdout().lock());

    // ── 5. Shutdown (only on `quit` or a console error) ───────
    if let Ok(ConsoleExit::Closed) = served {
        info!("Console closed; scheduler keeps running until the process is signalled");
        scheduler.wait();
    } else {
        info!("Shutting down");
        scheduler.stop();
    }
    if let Err(e) = controller.shutdown() {
        warn!("Shutdown: coils off failed: {}", e);
    }
    served.map(|_| ())
}

fn load_config(port: &impl ConfigPort) -> SystemConfig {
    match port.load() {
        Ok(cfg) => cfg,
        Err(ConfigError::NotFound) => {
            info!("Config: none stored, using defaults");
            SystemConfig::default()
        }
        Err(e) => {
            warn!("Config: load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    }
}

fn bring_up(config: &SystemConfig) -> Controller {
    let mut controller = match platform::open_bus(config) {
        Ok(bus) => {
            let array = MotorArray::new(bus, platform::delay(), MotorSettings::from_config(config));
            HardwareController::new(array, config)
        }
        Err(e) => {
            error!("Hardware: {:#}", e);
            HardwareController::disabled(config)
        }
    };

    match platform::open_pin(config.piezo_gpio, "piezo") {
        Ok(pin) => controller = controller.with_alarm(PulseAlarm::piezo(pin, platform::delay())),
        Err(e) => warn!("Alarm: piezo unavailable: {:#}", e),
    }
    match platform::open_pin(config.indicator_gpio, "indicator") {
        Ok(pin) => {
            controller = controller.with_alarm(PulseAlarm::indicator(pin, platform::delay()));
        }
        Err(e) => warn!("Alarm: indicator unavailable: {:#}", e),
    }
    controller
}

// ── Console ───────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Command {
    Dispense(DispenseRequest),
    Home(Option<Direction>),
    Alarm(Duration),
    Status,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let int = |s: &str| s.parse::<i64>().map_err(|_| format!("not a number: {s}"));

    match (verb, args.as_slice()) {
        ("dispense", [motor, rest @ ..]) if rest.len() <= 2 => {
            let motor_id = motor.parse::<u8>().map_err(|_| format!("bad motor id: {motor}"))?;
            let direction = rest.first().copied().map(int).transpose()?.unwrap_or(1);
            let user_id = rest.get(1).copied().map(int).transpose()?;
            let direction = i32::try_from(direction).map_err(|_| "direction out of range".to_owned())?;
            Ok(Command::Dispense(DispenseRequest::new(user_id, motor_id, direction)))
        }
        ("home", []) => Ok(Command::Home(None)),
        ("home", [dir]) => {
            let sign = int(*dir)?;
            Ok(Command::Home(Some(Direction::from_sign(sign.signum() as i32))))
        }
        ("alarm", [secs]) => {
            let secs: f32 = secs.parse().map_err(|_| format!("bad duration: {secs}"))?;
            match Duration::try_from_secs_f32(secs) {
                Ok(d) if d <= MAX_ALARM_DURATION => Ok(Command::Alarm(d)),
                Ok(_) => Err(format!("alarm longer than {}s", MAX_ALARM_DURATION.as_secs())),
                Err(_) => Err(format!("bad duration: {secs}")),
            }
        }
        ("status", []) => Ok(Command::Status),
        ("quit" | "exit", []) => Ok(Command::Quit),
        _ => Err(format!("unrecognised request: {line}")),
    }
}

/// How the console loop ended.
#[derive(Debug, PartialEq)]
enum ConsoleExit {
    Quit,
    Closed,
}

fn serve_console<I2C, D>(
    controller: &Arc<HardwareController<I2C, D>>,
    homing_direction: Direction,
    input: impl BufRead,
    mut out: impl Write,
) -> Result<ConsoleExit>
where
    I2C: I2c + Send + 'static,
    D: DelayNs + Send + 'static,
{
    for line in input.lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_command(&line) {
            Ok(Command::Dispense(req)) => serde_json::to_value(controller.dispense(req))?,
            Ok(Command::Home(dir)) => {
                let results = controller.home_all(dir.unwrap_or(homing_direction));
                json!({ "success": results.values().all(|ok| *ok), "motors": results })
            }
            Ok(Command::Alarm(duration)) => {
                // Blocking call; keep the console responsive.
                let c = Arc::clone(controller);
                let _detached = thread::Builder::new()
                    .name("alarm".into())
                    .spawn(move || c.trigger_alarm(duration))
                    .context("starting alarm thread")?;
                json!({ "success": true, "error": null })
            }
            Ok(Command::Status) => json!({
                "enabled": controller.is_enabled(),
                "motors": controller.motor_status(),
            }),
            Ok(Command::Quit) => return Ok(ConsoleExit::Quit),
            Err(msg) => json!({ "success": false, "error": msg }),
        };

        writeln!(out, "{reply}")?;
        out.flush()?;
    }
    Ok(ConsoleExit::Closed)
}
