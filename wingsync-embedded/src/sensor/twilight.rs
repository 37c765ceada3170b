use alloc::format;
use alloc::string::String;

use crate::calendar::{Now, TwilightDelays};

/// Seconds between two light samples.
pub const LIGHT_SAMPLE_PERIOD_S: u64 = 60;

pub const DEFAULT_BOUNDARY: i32 = 30;

/// Consecutive qualifying samples that must be exceeded before a toggle.
const TWILIGHT_DEBOUNCE: u32 = 9;

/// Level separating learned night from learned day.
const DAYLIGHT_LEVEL: i32 = 100;

/// Once day and night have been learned, readings above this mean a sensor.
const LEARNED_PRESENCE_LEVEL: i32 = 8;

/// Minimum spacing between two learned nightfalls or daybreaks (20 h).
const LEARNING_INTERVAL_S: i64 = 72_000;

/// Debounced light state. `light == -1` means no sensor has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightState {
    pub light: i32,
    pub boundary: i32,
    /// Night for automation purposes, after the dusk/dawn delay.
    pub twilight: bool,
    /// Night as last decided by the debounced sensor.
    pub twilight_sensor: bool,
    pub twilight_counter: u32,
    pub daybreak_counter: u32,
    pub block_twilight_counter: bool,
    /// Unix time the light last fell below the daylight level.
    pub nightfall: Option<i64>,
    /// Unix time the light last stayed above the daylight level.
    pub daybreak: Option<i64>,
    /// Unix time of the last sensor toggle.
    pub overstep: Option<i64>,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            light: -1,
            boundary: DEFAULT_BOUNDARY,
            twilight: false,
            twilight_sensor: false,
            twilight_counter: 0,
            daybreak_counter: 0,
            block_twilight_counter: false,
            nightfall: None,
            daybreak: None,
            overstep: None,
        }
    }
}

impl LightState {
    pub fn is_active(&self) -> bool {
        self.light >= 0
    }

    pub fn has_learned_day(&self) -> bool {
        self.nightfall.is_some() && self.daybreak.is_some()
    }

    /// Hysteresis below the boundary.
    pub fn margin(&self) -> i32 {
        if self.boundary < 100 { 0 } else { 50 }
    }

    fn change_threshold(raw: i32) -> i32 {
        if raw < 30 { 5 } else { 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightEvent {
    pub raw: i32,
    /// The stored reading moved, the sensor appeared or it toggled.
    pub changed: bool,
    /// The debounced sensor side flipped.
    pub sensor_toggled: bool,
    /// The logical `twilight` flipped on this sample.
    pub twilight_toggled: bool,
    /// Something worth persisting changed.
    pub persist: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTwilight {
    twilight: bool,
    due_s: u64,
}

pub struct TwilightDetector {
    pub state: LightState,
    pending: Option<PendingTwilight>,
}

impl TwilightDetector {
    pub fn new(state: LightState) -> Self {
        Self {
            state,
            pending: None,
        }
    }

    /// First reading after power-up. Decides whether a sensor is fitted and
    /// seeds both twilight flags from it.
    pub fn probe(&mut self, raw: i32) -> bool {
        if self.state.is_active() || !self.detects(raw) {
            return false;
        }

        self.state.light = raw;
        self.state.twilight_sensor = raw < self.state.boundary;
        self.state.twilight = self.state.twilight_sensor;
        log::info!("Light sensor present ({})", raw);
        true
    }

    fn detects(&self, raw: i32) -> bool {
        raw > self.state.boundary || (self.state.has_learned_day() && raw > LEARNED_PRESENCE_LEVEL)
    }

    /// Feeds one periodic reading through the change filter and the
    /// debounced twilight decision.
    pub fn sample(&mut self, raw: i32, now: &Now, delays: &TwilightDelays) -> LightEvent {
        let mut event = LightEvent {
            raw,
            ..Default::default()
        };

        if self.state.is_active() {
            if (self.state.light - raw).abs() > LightState::change_threshold(raw) {
                self.state.light = raw;
                event.changed = true;
            }
        } else if self.detects(raw) {
            self.state.light = raw;
            event.changed = true;
            log::info!("Light sensor activated ({})", raw);
        }

        if !self.state.is_active() {
            return event;
        }

        self.debounce(now, delays, &mut event);
        event.persist |= self.learn(now);
        event
    }

    fn debounce(&mut self, now: &Now, delays: &TwilightDelays, event: &mut LightEvent) {
        let state = &mut self.state;
        let light = state.light;
        let boundary = state.boundary;
        let margin = state.margin();

        if state.block_twilight_counter {
            if light < boundary - margin || light > boundary + 50 {
                state.block_twilight_counter = false;
            }
            return;
        }

        // Only samples past the boundary count, any other sample restarts
        // the run.
        let crossed = if state.twilight_sensor {
            light > boundary
        } else {
            light < boundary
        };
        if !crossed {
            state.twilight_counter = 0;
            return;
        }
        state.twilight_counter += 1;
        if state.twilight_counter <= TWILIGHT_DEBOUNCE {
            return;
        }

        state.twilight_sensor = !state.twilight_sensor;
        state.block_twilight_counter = true;
        state.twilight_counter = 0;
        if let Some(local) = now.local {
            state.overstep = Some(local.unix);
        }
        log::info!(
            "Light sensor switched to {} at {}",
            if state.twilight_sensor { "night" } else { "day" },
            light
        );

        let twilight = state.twilight_sensor;
        event.changed = true;
        event.sensor_toggled = true;
        event.persist = true;
        event.twilight_toggled = self.schedule_twilight(twilight, now, delays);
    }

    /// Records learned nightfall and daybreak. Needs a valid clock.
    fn learn(&mut self, now: &Now) -> bool {
        let Some(local) = now.local else {
            return false;
        };
        let state = &mut self.state;
        let minute = local.minute_of_day;
        let nightfall = state.nightfall.unwrap_or(0);
        let daybreak = state.daybreak.unwrap_or(0);
        let mut learned = false;

        if state.light < DAYLIGHT_LEVEL
            && (local.unix - nightfall > LEARNING_INTERVAL_S
                || (nightfall < daybreak && minute > 720 && minute < 1380))
        {
            state.nightfall = Some(local.unix);
            learned = true;
        }

        if state.light > DAYLIGHT_LEVEL
            && (local.unix - daybreak > LEARNING_INTERVAL_S
                || (daybreak < nightfall && minute > 60 && minute < 720))
        {
            state.daybreak_counter += 1;
            if state.daybreak_counter > TWILIGHT_DEBOUNCE {
                state.daybreak = Some(local.unix);
                state.daybreak_counter = 0;
                learned = true;
            }
        } else {
            state.daybreak_counter = 0;
        }

        learned
    }

    /// Moves the logical twilight toward the sensor, honouring the dusk or
    /// dawn delay. Returns `true` when it flipped immediately.
    fn schedule_twilight(&mut self, twilight: bool, now: &Now, delays: &TwilightDelays) -> bool {
        if self.state.twilight == twilight {
            self.pending = None;
            return false;
        }

        let delay = if twilight { delays.dusk } else { delays.dawn };
        let delay_min = delay.unsigned_abs() as u64;
        if delay_min == 0 {
            self.pending = None;
            self.state.twilight = twilight;
            return true;
        }

        log::debug!("Twilight change deferred by {} min", delay_min);
        self.pending = Some(PendingTwilight {
            twilight,
            due_s: now.uptime_s + delay_min * 60,
        });
        false
    }

    /// Applies a deferred twilight change once its delay has run out.
    pub fn advance(&mut self, now: &Now) -> bool {
        match self.pending {
            Some(pending) if now.uptime_s >= pending.due_s => {
                self.pending = None;
                if self.state.twilight == pending.twilight {
                    return false;
                }
                self.state.twilight = pending.twilight;
                log::info!("Delayed twilight change to {}", pending.twilight);
                true
            }
            _ => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Marks a sensor as fitted without waiting for a bright reading.
    pub fn activate(&mut self, calendar_twilight: bool) -> bool {
        if self.state.is_active() {
            return false;
        }

        self.state.light = self.state.boundary;
        self.state.twilight_sensor = calendar_twilight;
        self.state.twilight = calendar_twilight;
        self.pending = None;
        log::info!("Light sensor enabled manually");
        true
    }

    /// Forgets the sensor and everything learned from it.
    pub fn deactivate(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }

        let state = &mut self.state;
        state.light = -1;
        state.twilight_sensor = false;
        state.twilight_counter = 0;
        state.daybreak_counter = 0;
        state.block_twilight_counter = false;
        state.nightfall = None;
        state.daybreak = None;
        state.overstep = None;
        self.pending = None;
        log::info!("Light sensor disabled");
        true
    }

    /// `"<raw>[t][;counter]"`, or `"-1"` without a sensor. The counter is
    /// only included when `basic` is false.
    pub fn sensor_detail(&self, basic: bool) -> String {
        let state = &self.state;
        if !state.is_active() {
            return String::from("-1");
        }

        let mut detail = format!("{}", state.light);
        if state.twilight_sensor {
            detail.push('t');
        }
        if !basic && state.twilight_counter > 0 {
            detail.push_str(&format!(";{}", state.twilight_counter));
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::LocalTime;

    const NO_DELAY: TwilightDelays = TwilightDelays { dusk: 0, dawn: 0 };

    fn detector(boundary: i32, light: i32, night: bool) -> TwilightDetector {
        TwilightDetector::new(LightState {
            light,
            boundary,
            twilight: night,
            twilight_sensor: night,
            ..Default::default()
        })
    }

    fn minute(n: u64) -> Now {
        Now::uptime(n * 60)
    }

    #[test]
    fn test_activation() {
        let mut detector = detector(30, -1, false);

        let event = detector.sample(20, &minute(1), &NO_DELAY);
        assert!(!event.changed);
        assert!(!detector.state.is_active());

        let event = detector.sample(45, &minute(2), &NO_DELAY);
        assert!(event.changed);
        assert_eq!(detector.state.light, 45);
    }

    #[test]
    fn test_change_threshold() {
        let mut detector = detector(300, 500, false);

        assert!(!detector.sample(515, &minute(1), &NO_DELAY).changed);
        assert!(detector.sample(521, &minute(2), &NO_DELAY).changed);

        let mut dark = detector_with_light(20);
        assert!(!dark.sample(24, &minute(1), &NO_DELAY).changed);
        assert!(dark.sample(26, &minute(2), &NO_DELAY).changed);
    }

    fn detector_with_light(light: i32) -> TwilightDetector {
        detector(10, light, false)
    }

    #[test]
    fn test_single_transient_never_toggles() {
        let mut detector = detector(300, 600, false);

        detector.sample(100, &minute(1), &NO_DELAY);
        detector.sample(600, &minute(2), &NO_DELAY);

        assert!(!detector.state.twilight_sensor);
        assert_eq!(detector.state.twilight_counter, 0);
        assert_eq!(detector.sensor_detail(false), "600");
    }

    #[test]
    fn test_ten_samples_toggle_to_night() {
        let mut detector = detector(300, 600, false);

        for n in 1..10 {
            let event = detector.sample(100, &minute(n), &NO_DELAY);
            assert!(!event.sensor_toggled, "Toggled after {} samples", n);
        }
        assert_eq!(detector.sensor_detail(false), "100;9");
        assert_eq!(detector.sensor_detail(true), "100");

        let event = detector.sample(100, &minute(10), &NO_DELAY);
        assert!(event.sensor_toggled);
        assert!(event.twilight_toggled);
        assert!(detector.state.twilight);
        assert!(detector.state.block_twilight_counter);
        assert_eq!(detector.sensor_detail(false), "100t");
    }

    #[test]
    fn test_samples_short_of_boundary_restart_count() {
        let mut detector = detector(300, 600, false);

        for n in 1..=12 {
            detector.sample(320, &minute(n), &NO_DELAY);
        }
        assert_eq!(detector.state.twilight_counter, 0);

        let event = detector.sample(100, &minute(13), &NO_DELAY);
        assert!(!event.sensor_toggled);
        assert_eq!(detector.state.twilight_counter, 1);

        detector.sample(320, &minute(14), &NO_DELAY);
        assert_eq!(detector.state.twilight_counter, 0);
        assert!(!detector.state.twilight_sensor);
    }

    #[test]
    fn test_lockout_until_margin_cleared() {
        let mut detector = detector(300, 100, true);
        detector.state.block_twilight_counter = true;

        // 260 is inside the band [250, 350]
        for n in 1..20 {
            detector.sample(260, &minute(n), &NO_DELAY);
        }
        assert!(detector.state.block_twilight_counter);
        assert_eq!(detector.state.twilight_counter, 0);

        detector.sample(400, &minute(20), &NO_DELAY);
        assert!(!detector.state.block_twilight_counter);

        for n in 21..31 {
            detector.sample(400, &minute(n), &NO_DELAY);
        }
        assert!(!detector.state.twilight_sensor);
    }

    #[test]
    fn test_dusk_delay_defers_logical_twilight() {
        let delays = TwilightDelays { dusk: -15, dawn: 0 };
        let mut detector = detector(300, 600, false);

        let mut toggled = None;
        for n in 1..=10 {
            let event = detector.sample(100, &minute(n), &delays);
            if event.sensor_toggled {
                toggled = Some(n);
                assert!(!event.twilight_toggled);
            }
        }
        assert_eq!(toggled, Some(10));
        assert!(detector.state.twilight_sensor);
        assert!(!detector.state.twilight);
        assert!(detector.has_pending());

        assert!(!detector.advance(&minute(24)));
        assert!(detector.advance(&minute(25)));
        assert!(detector.state.twilight);
        assert!(!detector.has_pending());
    }

    #[test]
    fn test_learns_nightfall_and_daybreak() {
        // 2024-06-03 20:00 UTC
        let evening = 1_717_444_800;
        let mut detector = detector(30, 200, false);

        let now = Now::new(60, LocalTime::from_unix(evening, 0));
        let event = detector.sample(50, &now, &NO_DELAY);
        assert!(event.persist);
        assert_eq!(detector.state.nightfall, Some(evening));

        let morning = evening + 10 * 3600;
        for n in 0..10 {
            let unix = morning + n * 60;
            let now = Now::new(36_000 + n as u64 * 60, LocalTime::from_unix(unix, 0));
            detector.sample(400, &now, &NO_DELAY);
        }
        assert_eq!(detector.state.daybreak, Some(morning + 9 * 60));
        assert!(detector.state.has_learned_day());

        assert!(detector.deactivate());
        assert!(!detector.state.has_learned_day());
        assert_eq!(detector.sensor_detail(true), "-1");
        assert!(detector.activate(true));
        assert_eq!(detector.state.light, 30);
        assert!(detector.state.twilight_sensor);
    }

    #[test]
    fn test_boot_reading_detects_sensor() {
        let mut detector = detector(30, -1, false);
        assert!(!detector.probe(12));

        detector.state.nightfall = Some(1);
        detector.state.daybreak = Some(2);
        assert!(detector.probe(12));
        assert!(detector.state.twilight_sensor);
        assert!(detector.state.twilight);
    }
}
