use std::error::Error;
use std::path::PathBuf;
use std::{env, io};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

/// Installation applied on first start, when the store holds no settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub storage_path: String,
    pub utc_offset_minutes: i32,
    pub steps: [u32; 3],
    pub location: Option<String>,
    pub smart: Option<String>,
    #[serde(default)]
    pub dusk: i32,
    #[serde(default)]
    pub dawn: i32,
}

/// Target sent to the controller `at_s` simulated seconds after start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub at_s: u64,
    /// Wing digits, e.g. `12`.
    pub wings: u32,
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mock {
    pub start_unix: i64,
    pub tick_ms: u64,
    pub seconds_per_tick: u64,
    pub polls_per_second: u32,
    pub light_noise: i32,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub device: Device,
    pub mock: Mock,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        let mut settings: Settings = toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../",
            "configs/default.toml"
        )))?;

        settings.device.storage_path = Self::normalize_path(&settings.device.storage_path)?
            .to_string_lossy()
            .to_string();

        Ok(settings)
    }

    fn normalize_path(path: &str) -> io::Result<PathBuf> {
        let path_buf = PathBuf::from(path);

        Ok(if path_buf.is_absolute() {
            path_buf
        } else {
            env::current_dir()?.as_path().join(&path_buf)
        })
    }
}
