use alloc::string::{String, ToString};

use crate::automation::RuleSet;
use crate::calendar::{GeoLocation, MINUTES_PER_DAY, SolarCache, TwilightDelays};
use crate::sensor::{LightState, TwilightDetector};
use crate::stepper::{all_idle, is_independent, mirror_tandem};
use crate::storage::SettingsRecord;
use crate::types::{SequencingFlags, WING_COUNT, Wing, WingMask, WingStatus};

/// Largest travel a wing can be given; positions are `i32` pulse offsets.
pub const MAX_STEPS: u32 = i32::MAX as u32;

/// What the motor drivers are currently used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Selected wings step forward until the measurement is ended.
    Measuring(WingMask),
}

/// All mutable device state, owned by the controller and passed by reference.
pub struct DeviceState {
    pub wings: [Wing; WING_COUNT],
    pub flags: SequencingFlags,
    pub detector: TwilightDetector,
    pub solar: SolarCache,
    pub delays: TwilightDelays,
    pub rules: RuleSet,
    /// Set while any wing is sent fully closed; holds back dawn rules.
    pub lock: bool,
    pub mode: Mode,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            wings: [Wing::default(); WING_COUNT],
            flags: SequencingFlags::default(),
            detector: TwilightDetector::new(LightState::default()),
            solar: SolarCache::default(),
            delays: TwilightDelays::default(),
            rules: RuleSet::default(),
            lock: false,
            mode: Mode::Normal,
        }
    }
}

impl DeviceState {
    pub fn is_converged(&self) -> bool {
        all_idle(&self.wings, &self.flags)
    }

    pub fn is_measuring(&self) -> bool {
        matches!(self.mode, Mode::Measuring(_))
    }

    pub fn actuals(&self) -> [i32; WING_COUNT] {
        core::array::from_fn(|index| self.wings[index].actual)
    }

    pub fn destinations(&self) -> [i32; WING_COUNT] {
        core::array::from_fn(|index| self.wings[index].destination)
    }

    /// Installed wings of `mask` that can be addressed on their own.
    pub fn addressable(&self, mask: WingMask) -> WingMask {
        let mut addressable = WingMask::NONE;
        for index in mask.iter() {
            if self.wings[index].installed() && is_independent(&self.flags, index) {
                addressable.insert(index);
            }
        }
        addressable
    }

    pub fn status(&self) -> [WingStatus; WING_COUNT] {
        core::array::from_fn(|index| WingStatus::from(&self.wings[index]))
    }

    /// `"a;b;c"` destination percentages, as sent to peers.
    pub fn destination_summary(&self) -> String {
        let [a, b, c] = self.wings.map(|wing| wing.destination_percent());
        alloc::format!("{};{};{}", a, b, c)
    }

    /// Recomputes the lock from the destinations. Returns `true` if it changed.
    pub fn update_lock(&mut self) -> bool {
        let lock = self
            .wings
            .iter()
            .any(|wing| wing.installed() && wing.destination == wing.travel());
        if lock == self.lock {
            return false;
        }
        self.lock = lock;
        true
    }

    pub fn mirror(&mut self) {
        mirror_tandem(&mut self.wings, &self.flags);
    }

    /// Patches the state with every readable field of `record`. Unset or
    /// malformed fields keep their current value.
    pub fn apply_record(&mut self, record: &SettingsRecord) {
        for index in 0..WING_COUNT {
            let wing = &mut self.wings[index];
            if let Some(steps) = record.steps {
                if steps[index] <= MAX_STEPS {
                    wing.steps = steps[index];
                } else {
                    log::warn!(
                        "Keeping travel of wing {}, {} steps is out of range",
                        index + 1,
                        steps[index]
                    );
                }
            }
            if let Some(fixit) = record.fixit {
                wing.fixit = fixit[index];
            }
            if let Some(cycles) = record.cycles {
                wing.cycles = cycles[index];
            }
            if let Some(destination) = record.destination {
                wing.destination = wing.clamp_target(destination[index]);
            } else {
                wing.destination = wing.clamp_target(wing.destination);
            }
        }

        let flags = &mut self.flags;
        flags.reversed = record.reversed.unwrap_or(flags.reversed);
        flags.separately = record.separately.unwrap_or(flags.separately);
        flags.inverted_sequence = record.inverted.unwrap_or(flags.inverted_sequence);
        flags.tandem = record.tandem.unwrap_or(flags.tandem);

        if let Some(smart) = &record.smart {
            self.rules.rebuild(smart);
        }
        if let Some(location) = &record.location {
            if location.trim().is_empty() {
                self.solar.set_location(None);
            } else {
                match location.parse::<GeoLocation>() {
                    Ok(location) => {
                        self.solar.set_location(Some(location));
                    }
                    Err(e) => log::warn!("Keeping previous location, '{}': {}", location, e),
                }
            }
        }
        if let Some(dusk) = record.dusk.filter(|&delay| valid_delay(delay, "dusk")) {
            self.delays.dusk = dusk;
        }
        if let Some(dawn) = record.dawn.filter(|&delay| valid_delay(delay, "dawn")) {
            self.delays.dawn = dawn;
        }
        self.solar.sunset = record.sunset.or(self.solar.sunset);
        self.solar.sunrise = record.sunrise.or(self.solar.sunrise);
        if let Some(twilight) = record.twilight {
            self.solar.calendar_twilight = twilight && self.solar.geo_location.is_some();
        }
        self.lock = record.lock.unwrap_or(self.lock);

        let light = &mut self.detector.state;
        light.boundary = record.boundary.unwrap_or(light.boundary);
        if let Some(sensor_twilight) = record.sensor_twilight {
            light.twilight_sensor = sensor_twilight;
            light.twilight = sensor_twilight;
        }
        light.nightfall = record.nightfall.or(light.nightfall);
        light.daybreak = record.daybreak.or(light.daybreak);
        light.overstep = record.overstep.or(light.overstep);

        self.mirror();
    }

    /// Full settings record for persistence.
    pub fn to_record(&self) -> SettingsRecord {
        let light = &self.detector.state;
        SettingsRecord {
            steps: Some(self.wings.map(|wing| wing.steps)),
            destination: Some(self.destinations()),
            fixit: Some(self.wings.map(|wing| wing.fixit)),
            cycles: Some(self.wings.map(|wing| wing.cycles)),
            reversed: Some(self.flags.reversed),
            separately: Some(self.flags.separately),
            inverted: Some(self.flags.inverted_sequence),
            tandem: Some(self.flags.tandem),
            smart: Some(self.rules.source().to_string()),
            location: Some(
                self.solar
                    .geo_location
                    .map(|location| location.to_string())
                    .unwrap_or_default(),
            ),
            dusk: Some(self.delays.dusk),
            dawn: Some(self.delays.dawn),
            sunset: self.solar.sunset,
            sunrise: self.solar.sunrise,
            twilight: Some(self.solar.calendar_twilight),
            lock: Some(self.lock),
            boundary: Some(light.boundary),
            sensor_twilight: Some(light.twilight_sensor),
            nightfall: light.nightfall,
            daybreak: light.daybreak,
            overstep: light.overstep,
        }
    }
}

fn valid_delay(delay: i32, name: &str) -> bool {
    let valid = delay.unsigned_abs() < MINUTES_PER_DAY as u32;
    if !valid {
        log::warn!("Keeping previous {} delay, {} min is out of range", name, delay);
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_record_clamps_and_keeps_missing() {
        let mut state = DeviceState::default();
        state.flags.separately = true;
        state.delays.dawn = 15;

        let record = SettingsRecord::from_json(
            r#"{"steps":[200,100,0],"destination":[250,-5,40],"reversed":true,"location":"north","smart":"sunset;w=1","dusk":-10}"#,
        )
        .unwrap();
        state.apply_record(&record);

        assert_eq!(state.destinations(), [200, 0, 0]);
        assert!(state.flags.reversed);
        assert!(state.flags.separately, "Missing field keeps its value");
        assert_eq!(state.solar.geo_location, None);
        assert_eq!(state.rules.len(), 1);
        assert_eq!(state.delays, TwilightDelays { dusk: -10, dawn: 15 });
    }

    #[test]
    fn test_apply_record_keeps_out_of_range_fields() {
        let mut state = DeviceState::default();
        state.wings[0].steps = 200;
        state.delays.dusk = 20;

        let record = SettingsRecord::from_json(
            r#"{"steps":[3000000000,100,0],"destination":[150,50,0],"dusk":2147483647,"dawn":-1440}"#,
        )
        .unwrap();
        state.apply_record(&record);

        assert_eq!(state.wings[0].steps, 200);
        assert_eq!(state.wings[1].steps, 100);
        assert_eq!(state.destinations(), [150, 50, 0]);
        assert_eq!(state.delays, TwilightDelays { dusk: 20, dawn: 0 });
    }

    #[test]
    fn test_record_round_trip() {
        let mut state = DeviceState::default();
        state.wings[0] = Wing {
            steps: 300,
            destination: 150,
            actual: 100,
            fixit: -3,
            cycles: 7,
        };
        state.flags.tandem = true;
        state.rules.rebuild("t=07:00;a=0");
        state.solar.set_location("52.23x21.01".parse().ok());
        state.detector.state.boundary = 250;
        state.lock = true;

        let json = state.to_record().to_json().unwrap();
        let mut restored = DeviceState::default();
        restored.apply_record(&SettingsRecord::from_json(&json).unwrap());

        assert_eq!(restored.wings[0].steps, 300);
        assert_eq!(restored.wings[0].destination, 150);
        assert_eq!(restored.wings[0].fixit, -3);
        assert_eq!(restored.wings[0].cycles, 7);
        assert_eq!(restored.wings[1].destination, 150, "Tandem mirrors wing 1");
        assert!(restored.flags.tandem);
        assert_eq!(restored.rules.source(), "t=07:00;a=0");
        assert_eq!(restored.solar.geo_location, state.solar.geo_location);
        assert_eq!(restored.detector.state.boundary, 250);
        assert!(restored.lock);
    }

    #[test]
    fn test_lock_and_addressable() {
        let mut state = DeviceState::default();
        state.wings[0].steps = 100;
        state.wings[1].steps = 100;

        state.wings[1].destination = 100;
        assert!(state.update_lock());
        assert!(state.lock);
        assert!(!state.update_lock());

        assert_eq!(state.addressable(WingMask::ALL), WingMask::from_digits(12));
        state.flags.tandem = true;
        assert_eq!(state.addressable(WingMask::ALL), WingMask::single(0));
        assert_eq!(state.destination_summary(), "0;100;0");
    }
}
