#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use time::Date;

use wingsync_embedded::{
    Controller, Error, GeoLocation, LightSource, LocalStorage, LocalTime, MemoryStorage, Now,
    PeerNotifier, Result, SETTINGS_KEY, SimulatedMotor, SolarCalculator, SunTimes,
};

/// 2024-06-03 00:00 UTC, a Monday.
pub const MONDAY_MIDNIGHT: i64 = 1_717_372_800;

pub type TestController =
    Controller<SimulatedMotor, ScriptedLight, MemoryStorage, FixedSun, RecordingNotifier>;

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub payloads: Vec<String>,
}

impl PeerNotifier for RecordingNotifier {
    fn notify(&mut self, payload: &str) {
        self.payloads.push(payload.to_string());
    }
}

/// Light reading shared with the test, `None` while the sensor is missing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLight {
    pub value: Rc<Cell<Option<i32>>>,
}

impl ScriptedLight {
    pub fn set(&self, value: Option<i32>) {
        self.value.set(value);
    }
}

impl LightSource for ScriptedLight {
    fn read_raw(&mut self) -> Result<i32> {
        self.value.get().ok_or(Error::SensorUnavailable)
    }
}

/// Same sunrise and sunset every day.
#[derive(Debug, Clone, Copy)]
pub struct FixedSun {
    pub times: SunTimes,
}

impl Default for FixedSun {
    fn default() -> Self {
        Self {
            times: SunTimes {
                sunrise: 5 * 60,
                sunset: 20 * 60,
            },
        }
    }
}

impl SolarCalculator for FixedSun {
    fn sun_times(&mut self, _location: &GeoLocation, _date: Date) -> Option<SunTimes> {
        Some(self.times)
    }
}

pub fn storage_with(settings: &str) -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    storage.set_item(SETTINGS_KEY, settings).unwrap();
    storage
}

/// Boots a controller over `storage` with the light sensor unplugged.
pub fn booted(storage: MemoryStorage) -> (TestController, ScriptedLight) {
    booted_with_light(storage, None)
}

pub fn booted_with_light(
    storage: MemoryStorage,
    reading: Option<i32>,
) -> (TestController, ScriptedLight) {
    let light = ScriptedLight::default();
    light.set(reading);
    let mut controller = Controller::new(
        SimulatedMotor::new(),
        light.clone(),
        storage,
        FixedSun::default(),
        RecordingNotifier::default(),
    );
    controller.boot();
    (controller, light)
}

/// Monday at `hour:minute` UTC, `uptime_s` seconds after power-up.
pub fn at(uptime_s: u64, hour: i64, minute: i64) -> Now {
    let unix = MONDAY_MIDNIGHT + hour * 3600 + minute * 60;
    Now::new(uptime_s, LocalTime::from_unix(unix, 0))
}

/// Polls until the wings are at rest. Returns the number of passes taken.
pub fn run_until_converged(controller: &mut TestController, uptime_s: u64) -> usize {
    let mut passes = 0;
    while !controller.state().is_converged() {
        controller.poll(&Now::uptime(uptime_s));
        passes += 1;
        assert!(passes < 100_000, "Wings never came to rest");
    }
    passes
}
