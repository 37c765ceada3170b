mod memory;
mod settings;

pub use memory::*;
pub use settings::*;

use alloc::format;
use alloc::string::String;
use core::fmt::Debug;

use crate::error::{Error, Result};
use crate::types::WING_COUNT;

pub const SETTINGS_KEY: &str = "settings";
pub const RESUME_KEY: &str = "resume";

/// Flat key/value persistence offered by the platform.
pub trait LocalStorage {
    type Error: Debug;

    fn get_item(&self, key: &str) -> core::result::Result<Option<String>, Self::Error>;

    fn set_item(&mut self, key: &str, value: &str) -> core::result::Result<(), Self::Error>;

    fn remove_item(&mut self, key: &str) -> core::result::Result<(), Self::Error>;
}

/// Main device settings, stored as one serialized record.
pub trait SettingsStore {
    fn load_settings(&self) -> Result<Option<String>>;

    fn save_settings(&mut self, record: &str) -> Result<()>;
}

/// Crash-recovery snapshot of the wing positions, kept apart from the
/// settings so it can be rewritten cheaply during motion.
pub trait ResumeStore {
    fn load_resume(&self) -> Result<Option<[i32; WING_COUNT]>>;

    fn save_resume(&mut self, actual: &[i32; WING_COUNT]) -> Result<()>;

    fn clear_resume(&mut self) -> Result<()>;
}

impl<S: LocalStorage> SettingsStore for S {
    fn load_settings(&self) -> Result<Option<String>> {
        self.get_item(SETTINGS_KEY).map_err(|e| {
            log::error!("Failed to read settings: {:?}", e);
            Error::StorageError
        })
    }

    fn save_settings(&mut self, record: &str) -> Result<()> {
        self.set_item(SETTINGS_KEY, record).map_err(|e| {
            log::error!("Failed to write settings: {:?}", e);
            Error::StorageError
        })
    }
}

impl<S: LocalStorage> ResumeStore for S {
    fn load_resume(&self) -> Result<Option<[i32; WING_COUNT]>> {
        let Some(snapshot) = self.get_item(RESUME_KEY).map_err(|e| {
            log::error!("Failed to read resume snapshot: {:?}", e);
            Error::StorageError
        })?
        else {
            return Ok(None);
        };
        parse_snapshot(&snapshot).map(Some)
    }

    fn save_resume(&mut self, actual: &[i32; WING_COUNT]) -> Result<()> {
        let snapshot = format!("{};{};{}", actual[0], actual[1], actual[2]);
        self.set_item(RESUME_KEY, &snapshot).map_err(|e| {
            log::error!("Failed to write resume snapshot: {:?}", e);
            Error::StorageError
        })
    }

    fn clear_resume(&mut self) -> Result<()> {
        self.remove_item(RESUME_KEY).map_err(|e| {
            log::error!("Failed to clear resume snapshot: {:?}", e);
            Error::StorageError
        })
    }
}

/// Parses the `"a;b;c"` snapshot form.
fn parse_snapshot(snapshot: &str) -> Result<[i32; WING_COUNT]> {
    let mut actual = [0; WING_COUNT];
    let mut parts = snapshot.trim().split(';');
    for slot in actual.iter_mut() {
        *slot = parts
            .next()
            .and_then(|part| part.trim().parse().ok())
            .ok_or(Error::InvalidSettings)?;
    }
    if parts.next().is_some() {
        return Err(Error::InvalidSettings);
    }
    Ok(actual)
}
