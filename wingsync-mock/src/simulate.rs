use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use embedded_io::{ErrorType, Read};
use rand::Rng;
use wingsync_embedded::{ADC_MAX_VALUE, PeerNotifier};

/// Simulated wall clock shared between the loop and the simulated sensor.
#[derive(Debug, Clone)]
pub struct SimClock {
    unix: Arc<AtomicI64>,
    utc_offset_minutes: i32,
}

impl SimClock {
    pub fn new(start_unix: i64, utc_offset_minutes: i32) -> Self {
        Self {
            unix: Arc::new(AtomicI64::new(start_unix)),
            utc_offset_minutes,
        }
    }

    pub fn unix(&self) -> i64 {
        self.unix.load(Ordering::Relaxed)
    }

    pub fn advance(&self, seconds: u64) {
        self.unix.fetch_add(seconds as i64, Ordering::Relaxed);
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }

    /// Local time of day as a fraction, 0.5 at noon.
    pub fn day_fraction(&self) -> f64 {
        let local_s = self.unix() + self.utc_offset_minutes as i64 * 60;
        local_s.rem_euclid(86_400) as f64 / 86_400.0
    }
}

/// ADC counts a photoresistor divider would read over the day.
pub fn simulation_counts(day_fraction: f64) -> f64 {
    let radians = day_fraction * 2.0 * std::f64::consts::PI;

    const MAX_DAYLIGHT_COUNTS: f64 = 600.0;
    const MAX_MOONLIGHT_COUNTS: f64 = 5.0;

    const SUNRISE_START: f64 = 0.18;
    const SUNRISE_END: f64 = 0.24;
    const SUNSET_START: f64 = 0.84;
    const SUNSET_END: f64 = 0.90;

    if (SUNRISE_START..=SUNSET_END).contains(&day_fraction) {
        if day_fraction <= SUNRISE_END {
            let ramp = ((day_fraction - SUNRISE_START) / (SUNRISE_END - SUNRISE_START))
                * std::f64::consts::PI
                / 2.0;
            ramp.sin() * MAX_DAYLIGHT_COUNTS
        } else if day_fraction >= SUNSET_START {
            let ramp = ((day_fraction - SUNSET_START) / (SUNSET_END - SUNSET_START))
                * std::f64::consts::PI
                / 2.0;
            ramp.cos() * MAX_DAYLIGHT_COUNTS
        } else {
            MAX_DAYLIGHT_COUNTS
        }
    } else {
        // Moonlight, brightest at midnight.
        radians.cos().max(0.0) * MAX_MOONLIGHT_COUNTS
    }
}

/// Photoresistor ADC following `simulation_counts` with some jitter. Each
/// read yields one conversion as two big-endian bytes.
pub struct SimulatedAdc {
    clock: SimClock,
    noise: i32,
}

impl SimulatedAdc {
    pub fn new(clock: SimClock, noise: i32) -> Self {
        Self {
            clock,
            noise: noise.abs(),
        }
    }

    fn counts(&self) -> u16 {
        let base = simulation_counts(self.clock.day_fraction()).round() as i32;
        let jitter = if self.noise > 0 {
            rand::rng().random_range(-self.noise..=self.noise)
        } else {
            0
        };
        (base + jitter).clamp(0, ADC_MAX_VALUE as i32) as u16
    }
}

impl ErrorType for SimulatedAdc {
    type Error = Infallible;
}

impl Read for SimulatedAdc {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let bytes = self.counts().to_be_bytes();
        let len = buf.len().min(bytes.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}

/// Peers of the simulated device: payloads end up in the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl PeerNotifier for TracingNotifier {
    fn notify(&mut self, payload: &str) {
        tracing::info!("Notify peers: {}", payload);
    }
}

#[cfg(test)]
mod tests {
    use wingsync_embedded::{LightSensor, LightSource};

    use super::*;

    #[test]
    fn test_counts_follow_the_day() {
        assert_eq!(simulation_counts(0.5), 600.0);
        assert!(simulation_counts(0.0) <= 5.0);
        assert!(simulation_counts(0.21) > 30.0);
        assert!(simulation_counts(0.89) < simulation_counts(0.85));
    }

    #[test]
    fn test_daylight_reading_in_range() {
        // 2024-06-03 00:00 UTC, shown at 02:00 local.
        let clock = SimClock::new(1_717_372_800, 120);
        let mut sensor = LightSensor::new(SimulatedAdc::new(clock.clone(), 3));

        let night = sensor.read_raw().unwrap();
        assert!((0..=8).contains(&night), "{}", night);

        clock.advance(10 * 3600);
        let day = sensor.read_raw().unwrap();
        assert!((597..=603).contains(&day), "{}", day);
    }
}
