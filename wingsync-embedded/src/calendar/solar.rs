use core::fmt;
use core::str::FromStr;

use time::Date;

use super::{LOCK_RESET_MINUTE, LocalTime, TwilightDelays, minute_crossed, offset_minute};
use crate::error::Error;

/// Installation site, written as `"<lat>x<lon>"` in settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl FromStr for GeoLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (latitude, longitude) = s.trim().split_once('x').ok_or(Error::InvalidLocation)?;
        let latitude: f64 = latitude.trim().parse().map_err(|_| Error::InvalidLocation)?;
        let longitude: f64 = longitude.trim().parse().map_err(|_| Error::InvalidLocation)?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLocation);
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.latitude, self.longitude)
    }
}

/// Sunrise and sunset of one day as local minutes of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: u16,
    pub sunset: u16,
}

/// Astronomical calculator. Returns `None` when the sun does not rise or set
/// on `date` at `location`.
pub trait SolarCalculator {
    fn sun_times(&mut self, location: &GeoLocation, date: Date) -> Option<SunTimes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarTransition {
    Sunset,
    Sunrise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarUpdate {
    pub refreshed: bool,
    pub transition: Option<CalendarTransition>,
    pub lock_released: bool,
}

/// Per-day cache of sunrise and sunset plus the calendar's own day/night flag.
#[derive(Debug, Clone, Default)]
pub struct SolarCache {
    pub geo_location: Option<GeoLocation>,
    /// Unix time of the last observed calendar sunset.
    pub sunset: Option<i64>,
    /// Unix time of the last observed calendar sunrise.
    pub sunrise: Option<i64>,
    pub next_sunset: Option<u16>,
    pub next_sunrise: Option<u16>,
    /// Day of month the cache was computed for.
    pub last_sun_check: Option<u8>,
    /// Night according to the calendar.
    pub calendar_twilight: bool,
    last_minute: Option<u16>,
}

impl SolarCache {
    pub fn new(geo_location: Option<GeoLocation>) -> Self {
        Self {
            geo_location,
            ..Default::default()
        }
    }

    /// Replaces the location. Returns `true` when it changed; the cached times
    /// are dropped so the next update recomputes them.
    pub fn set_location(&mut self, location: Option<GeoLocation>) -> bool {
        if self.geo_location == location {
            return false;
        }

        self.geo_location = location;
        self.next_sunset = None;
        self.next_sunrise = None;
        self.last_sun_check = None;
        if location.is_none() {
            self.sunset = None;
            self.sunrise = None;
            self.calendar_twilight = false;
        }
        true
    }

    /// Recomputes today's times once per day after 03:01, or whenever they are
    /// missing.
    pub fn refresh<C: SolarCalculator>(&mut self, local: &LocalTime, calculator: &mut C) -> bool {
        let Some(location) = self.geo_location else {
            return false;
        };

        let stale = local.minute_of_day > LOCK_RESET_MINUTE
            && self.last_sun_check != Some(local.day_of_month());
        if !stale && self.next_sunset.is_some() && self.next_sunrise.is_some() {
            return false;
        }

        self.last_sun_check = Some(local.day_of_month());
        match calculator.sun_times(&location, local.date) {
            Some(times) => {
                self.next_sunrise = Some(times.sunrise);
                self.next_sunset = Some(times.sunset);
                log::info!(
                    "Sun times for {}: sunrise {:02}:{:02}, sunset {:02}:{:02}",
                    local.date,
                    times.sunrise / 60,
                    times.sunrise % 60,
                    times.sunset / 60,
                    times.sunset % 60
                );
            }
            None => {
                self.next_sunrise = None;
                self.next_sunset = None;
                log::warn!("No sunrise or sunset on {} at {}", local.date, location);
            }
        }
        true
    }

    /// Advances the calendar to `local`, flipping `calendar_twilight` when a
    /// sunset or sunrise minute has been passed.
    pub fn update<C: SolarCalculator>(
        &mut self,
        local: &LocalTime,
        calculator: &mut C,
    ) -> CalendarUpdate {
        let minute = local.minute_of_day;
        let previous = self.last_minute.replace(minute);
        let mut update = CalendarUpdate::default();

        if self.geo_location.is_none() {
            update.lock_released = minute_crossed(previous, minute, LOCK_RESET_MINUTE);
            return update;
        }

        if previous != Some(minute) {
            update.refreshed = self.refresh(local, calculator);
        }

        let (Some(next_sunset), Some(next_sunrise)) = (self.next_sunset, self.next_sunrise) else {
            return update;
        };

        if !self.calendar_twilight && minute_crossed(previous, minute, next_sunset) {
            self.calendar_twilight = true;
            self.sunset = Some(local.unix);
            update.transition = Some(CalendarTransition::Sunset);
            update.lock_released = true;
        } else if self.calendar_twilight && minute_crossed(previous, minute, next_sunrise) {
            self.calendar_twilight = false;
            self.sunrise = Some(local.unix);
            update.transition = Some(CalendarTransition::Sunrise);
            update.lock_released = true;
        }

        if let Some(transition) = update.transition {
            log::info!("Calendar {:?} at minute {}", transition, minute);
        }
        update
    }

    /// Minute at which sunset rules fire.
    pub fn sunset_trigger(&self, delays: &TwilightDelays) -> Option<u16> {
        self.next_sunset
            .map(|minute| offset_minute(minute, delays.dusk))
    }

    /// Minute at which sunrise rules fire.
    pub fn sunrise_trigger(&self, delays: &TwilightDelays) -> Option<u16> {
        self.next_sunrise
            .map(|minute| offset_minute(minute, delays.dawn))
    }
}
