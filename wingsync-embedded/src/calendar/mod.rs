mod solar;

pub use solar::*;

use time::{Date, OffsetDateTime, UtcOffset, Weekday};

pub const MINUTES_PER_DAY: u16 = 1440;

/// 03:01, when the daily lock is released on devices without a location.
pub const LOCK_RESET_MINUTE: u16 = 181;

/// Wall-clock reading in the device's local zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    /// UTC unix seconds.
    pub unix: i64,
    pub date: Date,
    pub minute_of_day: u16,
    pub second: u8,
}

impl LocalTime {
    pub fn from_unix(unix: i64, utc_offset_minutes: i32) -> Option<Self> {
        let offset = UtcOffset::from_whole_seconds(utc_offset_minutes.checked_mul(60)?).ok()?;
        let local = OffsetDateTime::from_unix_timestamp(unix).ok()?.to_offset(offset);

        Some(Self {
            unix,
            date: local.date(),
            minute_of_day: local.hour() as u16 * 60 + local.minute() as u16,
            second: local.second(),
        })
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn day_of_month(&self) -> u8 {
        self.date.day()
    }
}

/// Time handed to each pass of the control loop.
///
/// `uptime_s` is monotonic and always present. `local` is `None` until the
/// clock has been set; calendar based automation stays inactive until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Now {
    pub uptime_s: u64,
    pub local: Option<LocalTime>,
}

impl Now {
    pub fn new(uptime_s: u64, local: Option<LocalTime>) -> Self {
        Self { uptime_s, local }
    }

    pub fn uptime(uptime_s: u64) -> Self {
        Self {
            uptime_s,
            local: None,
        }
    }
}

/// Signed offsets in minutes applied to dusk/sunset and dawn/sunrise events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TwilightDelays {
    pub dusk: i32,
    pub dawn: i32,
}

/// Adds a signed number of minutes to a minute of day, wrapping at midnight.
pub fn offset_minute(minute: u16, delta: i32) -> u16 {
    let day = MINUTES_PER_DAY as i32;
    (minute as i32 % day + delta.rem_euclid(day)).rem_euclid(day) as u16
}

/// Whether `target` lies in `(previous, current]`, wrapping at midnight.
///
/// Without a previous reading only an exact match counts, as does a jump of
/// more than half a day (clock adjustment).
pub fn minute_crossed(previous: Option<u16>, current: u16, target: u16) -> bool {
    let Some(previous) = previous else {
        return current == target;
    };
    if previous == current {
        return false;
    }

    let gap = (current + MINUTES_PER_DAY - previous) % MINUTES_PER_DAY;
    if gap > MINUTES_PER_DAY / 2 {
        return current == target;
    }

    if previous < current {
        previous < target && target <= current
    } else {
        target > previous || target <= current
    }
}

/// Whether `minute` lies in the inclusive window `[start, end]`, which may wrap
/// past midnight.
pub fn within_window(minute: u16, start: u16, end: u16) -> bool {
    if start <= end {
        start <= minute && minute <= end
    } else {
        minute >= start || minute <= end
    }
}
