use alloc::format;
use alloc::string::String;

use crate::automation::{AutomationInputs, RuleEngine};
use crate::calendar::{Now, SolarCalculator};
use crate::error::{Error, Result};
use crate::sensor::{LIGHT_SAMPLE_PERIOD_S, LightSource};
use crate::stepper::{MotorPort, TickOutcome, tick};
use crate::storage::{ResumeStore, SettingsRecord, SettingsStore};
use crate::types::{TargetValue, WING_COUNT, WingMask, WingStatus};

use super::PeerNotifier;
use super::calibration::CalibrationRequest;
use super::state::DeviceState;

/// What a single `poll` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Measured,
    Stepped(TickOutcome),
    Housekeeping,
    Idle,
}

/// Cooperative control loop around one owned `DeviceState`.
///
/// Each `poll` does exactly one unit of work: one measurement pulse, one
/// sequencer tick, or the once-per-second housekeeping (light sample, solar
/// calendar, smart rules).
pub struct Controller<M, L, S, C, N>
where
    M: MotorPort,
    L: LightSource,
    S: SettingsStore + ResumeStore,
    C: SolarCalculator,
    N: PeerNotifier,
{
    state: DeviceState,
    motor: M,
    light_source: L,
    store: S,
    calculator: C,
    notifier: N,
    engine: RuleEngine,
    last_housekeeping_s: Option<u64>,
    last_snapshot_s: Option<u64>,
    last_light_sample_s: Option<u64>,
}

impl<M, L, S, C, N> Controller<M, L, S, C, N>
where
    M: MotorPort,
    L: LightSource,
    S: SettingsStore + ResumeStore,
    C: SolarCalculator,
    N: PeerNotifier,
{
    pub fn new(motor: M, light_source: L, store: S, calculator: C, notifier: N) -> Self {
        Self {
            state: DeviceState::default(),
            motor,
            light_source,
            store,
            calculator,
            notifier,
            engine: RuleEngine::new(),
            last_housekeeping_s: None,
            last_snapshot_s: None,
            last_light_sample_s: None,
        }
    }

    /// Restores settings and any interrupted motion. Never fails: unreadable
    /// data is logged and the defaults are kept.
    pub fn boot(&mut self) {
        match self.store.load_settings() {
            Ok(Some(json)) => match SettingsRecord::from_json(&json) {
                Ok(record) => self.state.apply_record(&record),
                Err(e) => log::warn!("Starting with default settings: {}", e),
            },
            Ok(None) => log::info!("No stored settings, starting with defaults"),
            Err(e) => log::error!("Starting with default settings: {}", e),
        }

        for wing in self.state.wings.iter_mut() {
            wing.destination = wing.clamp_target(wing.destination);
            wing.actual = wing.destination;
        }

        match self.store.load_resume() {
            Ok(Some(actual)) if actual != self.state.destinations() => {
                for (wing, actual) in self.state.wings.iter_mut().zip(actual) {
                    wing.actual = actual;
                }
                self.state.mirror();
                log::info!(
                    "Resuming interrupted motion from {:?} to {:?}",
                    self.state.actuals(),
                    self.state.destinations()
                );
            }
            Ok(Some(_)) => self.clear_resume(),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Discarding resume snapshot: {}", e);
                self.clear_resume();
            }
        }

        if let Ok(raw) = self.light_source.read_raw() {
            self.state.detector.probe(raw);
        }
        self.motor.release();
    }

    /// Runs one pass of the loop.
    pub fn poll(&mut self, now: &Now) -> Pass {
        if self.state.is_measuring() {
            self.state.measurement_tick(&mut self.motor);
            return Pass::Measured;
        }

        if !self.state.is_converged() {
            let outcome = tick(&mut self.state.wings, &self.state.flags, &mut self.motor);
            if outcome.converged {
                self.clear_resume();
                self.last_snapshot_s = None;
                log::info!("Motion complete at {:?}", self.state.actuals());
            } else if self.last_snapshot_s != Some(now.uptime_s) {
                self.last_snapshot_s = Some(now.uptime_s);
                self.save_resume();
            }
            return Pass::Stepped(outcome);
        }

        if self.last_housekeeping_s == Some(now.uptime_s) {
            return Pass::Idle;
        }
        self.last_housekeeping_s = Some(now.uptime_s);
        self.housekeeping(now);
        Pass::Housekeeping
    }

    fn housekeeping(&mut self, now: &Now) {
        let mut persist = false;
        let mut twilight_edge = None;

        if self.state.detector.advance(now) {
            twilight_edge = Some(self.state.detector.state.twilight);
        }

        let sample_due = self
            .last_light_sample_s
            .is_none_or(|last| now.uptime_s.saturating_sub(last) >= LIGHT_SAMPLE_PERIOD_S);
        if sample_due {
            self.last_light_sample_s = Some(now.uptime_s);
            match self.light_source.read_raw() {
                Ok(raw) => {
                    let event = self.state.detector.sample(raw, now, &self.state.delays);
                    persist |= event.persist;
                    if event.twilight_toggled {
                        twilight_edge = Some(self.state.detector.state.twilight);
                    }
                    if event.changed {
                        self.notify_light();
                    }
                }
                Err(e) => log::trace!("No light sample: {}", e),
            }
        }

        if let Some(local) = now.local {
            let update = self.state.solar.update(&local, &mut self.calculator);
            if update.transition.is_some() {
                persist = true;
            }
            if update.lock_released && self.state.lock {
                self.state.lock = false;
                persist = true;
                log::info!("Smart lock released");
            }
        }

        let inputs = AutomationInputs {
            uptime_s: now.uptime_s,
            local: now.local,
            twilight_edge,
            twilight: self.state.detector.state.twilight,
            lock: self.state.lock,
            sunset_minute: self.state.solar.sunset_trigger(&self.state.delays),
            sunrise_minute: self.state.solar.sunrise_trigger(&self.state.delays),
        };
        let firings = self.engine.evaluate(&mut self.state.rules, &inputs);

        let mut targets = [None; WING_COUNT];
        for firing in firings.iter() {
            for index in self.state.addressable(firing.wing_mask).iter() {
                targets[index] = Some(TargetValue::Percent(firing.percent));
            }
        }
        if self.commit_targets(targets) {
            return;
        }

        if persist {
            self.save_settings();
        }
    }

    /// Moves the selected wings to `value`. Uninstalled wings and, in tandem,
    /// wings 2 and 3 are ignored. Returns `false` if nothing changed.
    pub fn apply_target(&mut self, wings: WingMask, value: TargetValue) -> Result<bool> {
        let selected = self.state.addressable(wings);
        let mut targets = [None; WING_COUNT];
        for index in selected.iter() {
            targets[index] = Some(value);
        }
        self.apply_targets(targets)
    }

    /// Per-wing form of `apply_target`.
    pub fn apply_targets(&mut self, targets: [Option<TargetValue>; WING_COUNT]) -> Result<bool> {
        if self.state.is_measuring() {
            return Err(Error::MeasurementActive);
        }

        let selected = self.state.addressable(WingMask::ALL);
        let mut filtered = [None; WING_COUNT];
        for index in selected.iter() {
            filtered[index] = targets[index];
        }
        if filtered.iter().all(Option::is_none) {
            return Err(Error::NoWingSelected);
        }

        Ok(self.commit_targets(filtered))
    }

    fn commit_targets(&mut self, targets: [Option<TargetValue>; WING_COUNT]) -> bool {
        let mut changed = false;
        for (wing, target) in self.state.wings.iter_mut().zip(targets) {
            let Some(target) = target else {
                continue;
            };
            let destination = target.to_destination(wing);
            if wing.destination != destination {
                wing.destination = destination;
                changed = true;
            }
        }
        if !changed {
            return false;
        }

        self.state.mirror();
        self.state.prepare_motion();
        self.state.update_lock();
        self.save_resume();
        self.save_settings();
        self.notify_targets();
        true
    }

    /// Halts every wing where it stands.
    pub fn stop(&mut self) -> bool {
        if self.state.is_converged() {
            return false;
        }

        for wing in self.state.wings.iter_mut() {
            wing.destination = wing.actual;
        }
        self.state.mirror();
        self.motor.release();
        self.clear_resume();
        self.state.update_lock();
        self.save_settings();
        self.notify_targets();
        log::info!("Stopped at {:?}", self.state.actuals());
        true
    }

    pub fn get_state(&self) -> [WingStatus; WING_COUNT] {
        self.state.status()
    }

    pub fn start_measurement(&mut self, wings: WingMask) -> Result<()> {
        self.state.start_measurement(wings)
    }

    /// Stops a measurement where the wings stand and persists that position.
    pub fn cancel_measurement(&mut self) -> Result<()> {
        self.state.cancel_measurement(&mut self.motor)?;
        self.state.update_lock();
        self.save_settings();
        Ok(())
    }

    pub fn end_measurement(&mut self) -> Result<()> {
        self.state.end_measurement(&mut self.motor)?;
        self.state.update_lock();
        self.save_settings();
        Ok(())
    }

    pub fn calibrate(&mut self, request: &CalibrationRequest) -> Result<()> {
        if self.state.is_measuring() {
            return Err(Error::MeasurementActive);
        }

        let steps_changed = self.state.calibrate(request)?;
        if !self.state.is_converged() {
            self.save_resume();
        }
        self.state.update_lock();
        if steps_changed {
            self.save_settings();
        }
        Ok(())
    }

    pub fn set_min(&mut self, wings: WingMask) -> Result<()> {
        self.admin_positioning(wings, DeviceState::set_min)
    }

    pub fn set_max(&mut self, wings: WingMask) -> Result<()> {
        self.admin_positioning(wings, DeviceState::set_max)
    }

    pub fn set_as_max(&mut self, wings: WingMask) -> Result<()> {
        self.admin_positioning(wings, DeviceState::set_as_max)
    }

    fn admin_positioning(
        &mut self,
        wings: WingMask,
        apply: fn(&mut DeviceState, WingMask) -> WingMask,
    ) -> Result<()> {
        if self.state.is_measuring() {
            return Err(Error::MeasurementActive);
        }
        if apply(&mut self.state, wings).is_empty() {
            return Err(Error::NoWingSelected);
        }

        if self.state.is_converged() {
            self.clear_resume();
        }
        self.state.update_lock();
        self.save_settings();
        Ok(())
    }

    /// Treats the sensor as fitted even before it has seen daylight.
    pub fn activate_sensor(&mut self) -> bool {
        let calendar_twilight = self.state.solar.calendar_twilight;
        if !self.state.detector.activate(calendar_twilight) {
            return false;
        }
        self.save_settings();
        self.notify_light();
        true
    }

    pub fn deactivate_sensor(&mut self) -> bool {
        if !self.state.detector.deactivate() {
            return false;
        }
        self.save_settings();
        self.notify_light();
        true
    }

    /// Patches settings received from the network. Positions are only moved
    /// through `apply_target`, and travel limits only change at rest.
    pub fn update_settings(&mut self, json: &str) -> Result<()> {
        let mut record = SettingsRecord::from_json(json)?;
        record.destination = None;
        if record.steps.is_some() && !self.state.is_converged() {
            log::warn!("Ignoring new travel limits while wings are moving");
            record.steps = None;
        }

        self.state.apply_record(&record);
        self.state.update_lock();
        self.save_settings();
        Ok(())
    }

    /// The network link went away; a running measurement cannot be ended
    /// safely without it.
    pub fn on_connectivity_lost(&mut self) {
        if self.state.is_measuring() {
            log::warn!("Connection lost, cancelling measurement");
            // Only fails when no measurement is running.
            let _ = self.cancel_measurement();
        }
    }

    pub fn sensor_detail(&self, basic: bool) -> String {
        self.state.detector.sensor_detail(basic)
    }

    pub fn settings_json(&self) -> Result<String> {
        self.state.to_record().to_json()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn save_settings(&mut self) {
        let saved = self
            .state
            .to_record()
            .to_json()
            .and_then(|json| self.store.save_settings(&json));
        if let Err(e) = saved {
            log::error!("Settings not saved, continuing in memory: {}", e);
        }
    }

    fn save_resume(&mut self) {
        if let Err(e) = self.store.save_resume(&self.state.actuals()) {
            log::error!("Resume snapshot not saved: {}", e);
        }
    }

    fn clear_resume(&mut self) {
        if let Err(e) = self.store.clear_resume() {
            log::error!("Resume snapshot not cleared: {}", e);
        }
    }

    fn notify_targets(&mut self) {
        let payload = format!("{{\"val\":\"{}\"}}", self.state.destination_summary());
        self.notifier.notify(&payload);
    }

    fn notify_light(&mut self) {
        let payload = format!("{{\"light\":\"{}\"}}", self.state.detector.sensor_detail(true));
        self.notifier.notify(&payload);
    }
}
