use embedded_io::Read;

use super::LightSource;
use crate::error::{Error, Result};

/// Full scale of the 10-bit photoresistor ADC.
pub const ADC_MAX_VALUE: u16 = 1023;

/// Photoresistor behind an ADC that reports each conversion as two big-endian
/// bytes. The raw count is used as-is; thresholds are configured in counts.
pub struct LightSensor<IO>
where
    IO: Read,
{
    io_device: IO,
    buffer: [u8; 4],
    adc_max_value: u16,
}

impl<IO> LightSensor<IO>
where
    IO: Read,
{
    pub fn new(io_device: IO) -> Self {
        Self {
            io_device,
            buffer: [0; 4],
            adc_max_value: ADC_MAX_VALUE,
        }
    }

    pub fn with_resolution(io_device: IO, adc_max_value: u16) -> Self {
        Self {
            io_device,
            buffer: [0; 4],
            adc_max_value,
        }
    }

    pub fn read_counts(&mut self) -> Result<u16> {
        self.buffer = [0; 4];

        let read_count = self
            .io_device
            .read(&mut self.buffer)
            .map_err(|_| Error::SensorUnavailable)?;

        if read_count < 2 {
            return Err(Error::SensorUnavailable);
        }

        let raw_value = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        if raw_value > self.adc_max_value {
            return Err(Error::SensorReadingOutOfRange);
        }

        Ok(raw_value)
    }
}

impl<IO> LightSource for LightSensor<IO>
where
    IO: Read,
{
    fn read_raw(&mut self) -> Result<i32> {
        self.read_counts().map(i32::from)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Debug)]
    pub struct MockIO {
        pub value: u16,
        pub short: bool,
    }

    impl embedded_io::ErrorType for MockIO {
        type Error = embedded_io::ErrorKind;
    }

    impl Read for MockIO {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
            if self.short || buf.len() < 2 {
                return Ok(0);
            }

            let bytes = self.value.to_be_bytes();
            buf[0] = bytes[0];
            buf[1] = bytes[1];

            Ok(2)
        }
    }

    #[test]
    fn test_light_sensor() {
        for raw in [0u16, 8, 250, 1023] {
            let mut sensor = LightSensor::new(MockIO {
                value: raw,
                short: false,
            });
            assert_eq!(sensor.read_raw(), Ok(raw as i32));
        }
    }

    #[test]
    fn test_light_sensor_rejects_bad_reads() {
        let mut sensor = LightSensor::new(MockIO {
            value: 2000,
            short: false,
        });
        assert_eq!(sensor.read_raw(), Err(Error::SensorReadingOutOfRange));

        let mut sensor = LightSensor::with_resolution(
            MockIO {
                value: 2000,
                short: false,
            },
            4095,
        );
        assert_eq!(sensor.read_raw(), Ok(2000));

        let mut sensor = LightSensor::new(MockIO {
            value: 10,
            short: true,
        });
        assert_eq!(sensor.read_raw(), Err(Error::SensorUnavailable));
    }
}
