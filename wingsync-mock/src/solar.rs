use chrono::{DateTime, NaiveDate, Utc};
use sunrise::{Coordinates, SolarDay, SolarEvent};
use wingsync_embedded::{GeoLocation, SolarCalculator, SunTimes};

/// Sunrise and sunset from the `sunrise` crate, shifted to the device's zone.
#[derive(Debug, Clone, Copy)]
pub struct SunriseCalculator {
    utc_offset_minutes: i32,
}

impl SunriseCalculator {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self { utc_offset_minutes }
    }

    fn local_minute(&self, utc: DateTime<Utc>) -> u16 {
        let local_s = utc.timestamp() + self.utc_offset_minutes as i64 * 60;
        (local_s.rem_euclid(86_400) / 60) as u16
    }
}

impl SolarCalculator for SunriseCalculator {
    fn sun_times(&mut self, location: &GeoLocation, date: time::Date) -> Option<SunTimes> {
        let date = NaiveDate::from_ymd_opt(date.year(), date.month() as u32, date.day() as u32)?;
        let coordinates = Coordinates::new(location.latitude, location.longitude)?;

        let solar_day = SolarDay::new(coordinates, date);
        let sunrise = solar_day.event_time(SolarEvent::Sunrise);
        let sunset = solar_day.event_time(SolarEvent::Sunset);
        // Polar day or night.
        if sunrise >= sunset {
            tracing::debug!("No sunrise or sunset on {} at {}", date, location);
            return None;
        }

        Some(SunTimes {
            sunrise: self.local_minute(sunrise),
            sunset: self.local_minute(sunset),
        })
    }
}
