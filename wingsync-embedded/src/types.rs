use core::fmt;

use serde::{Deserialize, Serialize};

pub const WING_COUNT: usize = 3;

/// Set of wings addressed by a command, stored as a bit field (bit 0 = wing 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WingMask(u8);

impl WingMask {
    pub const NONE: WingMask = WingMask(0);
    pub const ALL: WingMask = WingMask(0b111);

    /// Mask holding the single wing at `index` (0-based).
    pub fn single(index: usize) -> Self {
        if index < WING_COUNT {
            WingMask(1 << index)
        } else {
            WingMask::NONE
        }
    }

    /// Builds a mask from the decimal digit form used by clients, e.g. `13`
    /// selects wings 1 and 3. Digits outside `1..=3` are ignored.
    pub fn from_digits(mut digits: u32) -> Self {
        let mut mask = WingMask::NONE;
        while digits > 0 {
            let digit = (digits % 10) as usize;
            if (1..=WING_COUNT).contains(&digit) {
                mask.insert(digit - 1);
            }
            digits /= 10;
        }
        mask
    }

    pub fn contains(&self, index: usize) -> bool {
        index < WING_COUNT && self.0 & (1 << index) != 0
    }

    pub fn insert(&mut self, index: usize) {
        if index < WING_COUNT {
            self.0 |= 1 << index;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 & WingMask::ALL.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..WING_COUNT).filter(move |&index| self.contains(index))
    }
}

impl fmt::Display for WingMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in self.iter() {
            write!(f, "{}", index + 1)?;
        }
        Ok(())
    }
}

/// Motion state of a single wing, derived from its positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WingState {
    Idle,
    Advancing,
    Retreating,
}

/// One blind section.
///
/// Positions are pulse offsets from the fully open end; `steps` is the fully
/// closed end. A wing with `steps == 0` is not installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wing {
    pub steps: u32,
    pub destination: i32,
    pub actual: i32,
    pub fixit: i32,
    pub cycles: u32,
}

impl Wing {
    pub fn installed(&self) -> bool {
        self.steps > 0
    }

    pub fn state(&self) -> WingState {
        match self.destination.cmp(&self.actual) {
            core::cmp::Ordering::Equal => WingState::Idle,
            core::cmp::Ordering::Greater => WingState::Advancing,
            core::cmp::Ordering::Less => WingState::Retreating,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.destination == self.actual
    }

    /// Full travel as a position, saturating at `i32::MAX`.
    pub fn travel(&self) -> i32 {
        i32::try_from(self.steps).unwrap_or(i32::MAX)
    }

    /// Clamps a raw target into the calibrated travel.
    pub fn clamp_target(&self, value: i32) -> i32 {
        value.clamp(0, self.travel())
    }

    pub fn destination_percent(&self) -> u8 {
        to_percent(self.destination, self.steps)
    }

    pub fn actual_percent(&self) -> u8 {
        to_percent(self.actual, self.steps)
    }
}

/// Converts a pulse offset into a rounded percentage of full travel.
pub fn to_percent(value: i32, steps: u32) -> u8 {
    if value <= 0 || steps == 0 {
        return 0;
    }
    let steps = steps as i64;
    let percent = (value as i64 * 200 + steps) / (2 * steps);
    percent.min(u8::MAX as i64) as u8
}

/// Converts a percentage of full travel into a rounded pulse offset.
pub fn to_steps(percent: u8, steps: u32) -> i32 {
    if percent == 0 || steps == 0 {
        return 0;
    }
    ((percent as i64 * steps as i64 * 2 + 100) / 200).min(i32::MAX as i64) as i32
}

/// Device-wide sequencing options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencingFlags {
    /// Motor polarity: flips the level written to the shared direction line.
    pub reversed: bool,
    /// Wings wait for each other instead of travelling together.
    pub separately: bool,
    /// Wing 3 becomes the primary wing instead of wing 1.
    pub inverted_sequence: bool,
    /// Wing 2 mirrors wing 1; wing 3 is unused.
    pub tandem: bool,
}

/// A target handed to the controller by the network layer or a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetValue {
    Percent(u8),
    Raw(i32),
}

impl TargetValue {
    pub fn to_destination(&self, wing: &Wing) -> i32 {
        match *self {
            TargetValue::Percent(percent) => to_steps(percent.min(100), wing.steps),
            TargetValue::Raw(raw) => wing.clamp_target(raw),
        }
    }
}

/// Snapshot of one wing for status responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WingStatus {
    pub destination: u8,
    pub actual: u8,
    pub in_motion: bool,
}

impl From<&Wing> for WingStatus {
    fn from(wing: &Wing) -> Self {
        Self {
            destination: wing.destination_percent(),
            actual: wing.actual_percent(),
            in_motion: !wing.is_idle(),
        }
    }
}
