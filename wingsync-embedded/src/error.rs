use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    MotionInProgress,
    MeasurementActive,
    MeasurementInactive,
    NoWingSelected,
    InvalidSchedule,
    InvalidSettings,
    InvalidLocation,
    StorageError,
    SensorUnavailable,
    SensorReadingOutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MotionInProgress => write!(f, "Wings are in motion"),
            Error::MeasurementActive => write!(f, "Measurement already in progress"),
            Error::MeasurementInactive => write!(f, "No measurement in progress"),
            Error::NoWingSelected => write!(f, "No installed wing selected"),
            Error::InvalidSchedule => write!(f, "Invalid schedule string"),
            Error::InvalidSettings => write!(f, "Invalid settings record"),
            Error::InvalidLocation => write!(f, "Invalid geographic location"),
            Error::StorageError => write!(f, "Storage error"),
            Error::SensorUnavailable => write!(f, "Light sensor unavailable"),
            Error::SensorReadingOutOfRange => write!(f, "Sensor reading out of valid range"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
