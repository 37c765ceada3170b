mod light_sensor;
mod twilight;

pub use light_sensor::{ADC_MAX_VALUE, LightSensor};
pub use twilight::*;

use crate::error::{Error, Result};

/// Anything that can produce a raw ambient light reading.
pub trait LightSource {
    fn read_raw(&mut self) -> Result<i32>;
}

/// Placeholder for boards without a photoresistor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLightSensor;

impl LightSource for NoLightSensor {
    fn read_raw(&mut self) -> Result<i32> {
        Err(Error::SensorUnavailable)
    }
}
