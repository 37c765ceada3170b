use core::fmt;
use core::str::FromStr;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use time::Weekday;

use crate::error::Error;
use crate::types::WingMask;

pub const MAX_RULES: usize = 16;

/// Weekdays a rule is restricted to. Empty means every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet(u8);

impl DaySet {
    pub const EVERY_DAY: DaySet = DaySet(0);

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.is_every_day() || self.0 & (1 << (weekday.number_from_monday() - 1)) != 0
    }

    pub fn is_every_day(&self) -> bool {
        self.0 == 0 || self.0 == 0b111_1111
    }

    fn insert(&mut self, number_from_monday: u8) {
        self.0 |= 1 << (number_from_monday - 1);
    }
}

impl FromStr for DaySet {
    type Err = Error;

    /// Digits `1..=7`, Monday first, e.g. `"135"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = DaySet::EVERY_DAY;
        for c in s.chars() {
            match c.to_digit(10) {
                Some(day @ 1..=7) => days.insert(day as u8),
                _ => return Err(Error::InvalidSchedule),
            }
        }
        if days.0 == 0 {
            return Err(Error::InvalidSchedule);
        }
        Ok(days)
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in 1..=7u8 {
            if self.0 & (1 << (day - 1)) != 0 {
                write!(f, "{}", day)?;
            }
        }
        Ok(())
    }
}

/// One automation rule, e.g. `w=12;d=12345;a=40;t=07:30;sunrise;any`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartRule {
    pub enabled: bool,
    pub wing_mask: WingMask,
    pub days: DaySet,
    /// Target percent; `None` picks 100 % or 0 % from the trigger.
    pub action: Option<u8>,
    pub at_time: Option<u16>,
    pub end_time: Option<u16>,
    pub at_sunset: bool,
    pub at_sunrise: bool,
    pub at_dusk: bool,
    pub at_dawn: bool,
    pub any_required: bool,
    /// Uptime second of the last firing. Not part of the encoding.
    pub last_fired: Option<u64>,
}

impl Default for SmartRule {
    fn default() -> Self {
        Self {
            enabled: true,
            wing_mask: WingMask::ALL,
            days: DaySet::EVERY_DAY,
            action: None,
            at_time: None,
            end_time: None,
            at_sunset: false,
            at_sunrise: false,
            at_dusk: false,
            at_dawn: false,
            any_required: false,
            last_fired: None,
        }
    }
}

impl SmartRule {
    pub fn has_trigger(&self) -> bool {
        self.at_time.is_some()
            || self.end_time.is_some()
            || self.at_sunset
            || self.at_sunrise
            || self.at_dusk
            || self.at_dawn
    }

    /// Rules tied to the morning lift the blinds by default.
    pub fn lifts(&self) -> bool {
        self.at_sunrise || self.at_dawn
    }
}

fn parse_clock(s: &str) -> Result<u16, Error> {
    let (hours, minutes) = s.split_once(':').ok_or(Error::InvalidSchedule)?;
    let hours: u16 = hours.parse().map_err(|_| Error::InvalidSchedule)?;
    let minutes: u16 = minutes.parse().map_err(|_| Error::InvalidSchedule)?;
    if hours > 23 || minutes > 59 {
        return Err(Error::InvalidSchedule);
    }
    Ok(hours * 60 + minutes)
}

impl FromStr for SmartRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rule = SmartRule::default();

        for token in s.split(';').map(str::trim).filter(|token| !token.is_empty()) {
            match token.split_once('=') {
                Some(("w", digits)) => {
                    let digits: u32 = digits.parse().map_err(|_| Error::InvalidSchedule)?;
                    rule.wing_mask = WingMask::from_digits(digits);
                    if rule.wing_mask.is_empty() {
                        return Err(Error::InvalidSchedule);
                    }
                }
                Some(("d", days)) => rule.days = days.parse()?,
                Some(("a", percent)) => {
                    let percent: u8 = percent.parse().map_err(|_| Error::InvalidSchedule)?;
                    if percent > 100 {
                        return Err(Error::InvalidSchedule);
                    }
                    rule.action = Some(percent);
                }
                Some(("t", clock)) => rule.at_time = Some(parse_clock(clock)?),
                Some(("e", clock)) => rule.end_time = Some(parse_clock(clock)?),
                Some(_) => return Err(Error::InvalidSchedule),
                None => match token {
                    "off" => rule.enabled = false,
                    "sunset" => rule.at_sunset = true,
                    "sunrise" => rule.at_sunrise = true,
                    "dusk" => rule.at_dusk = true,
                    "dawn" => rule.at_dawn = true,
                    "any" => rule.any_required = true,
                    _ => return Err(Error::InvalidSchedule),
                },
            }
        }

        if !rule.has_trigger() {
            return Err(Error::InvalidSchedule);
        }
        Ok(rule)
    }
}

impl fmt::Display for SmartRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<String> = Vec::new();

        if !self.enabled {
            tokens.push(String::from("off"));
        }
        if self.wing_mask != WingMask::ALL {
            tokens.push(format!("w={}", self.wing_mask));
        }
        if !self.days.is_every_day() {
            tokens.push(format!("d={}", self.days));
        }
        if let Some(action) = self.action {
            tokens.push(format!("a={}", action));
        }
        if let Some(minute) = self.at_time {
            tokens.push(format!("t={:02}:{:02}", minute / 60, minute % 60));
        }
        if let Some(minute) = self.end_time {
            tokens.push(format!("e={:02}:{:02}", minute / 60, minute % 60));
        }
        for (set, name) in [
            (self.at_sunset, "sunset"),
            (self.at_sunrise, "sunrise"),
            (self.at_dusk, "dusk"),
            (self.at_dawn, "dawn"),
            (self.any_required, "any"),
        ] {
            if set {
                tokens.push(String::from(name));
            }
        }

        write!(f, "{}", tokens.join(";"))
    }
}

/// Parsed schedule, rebuilt in place whenever its source string changes.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    source: String,
    rules: heapless::Vec<SmartRule, MAX_RULES>,
}

impl RuleSet {
    pub fn parse(source: &str) -> Self {
        let mut rule_set = Self::default();
        rule_set.rebuild(source);
        rule_set
    }

    /// Replaces the rules from a comma separated schedule. Malformed rules are
    /// skipped, as is anything past the capacity. Returns `false` when the
    /// source is unchanged.
    pub fn rebuild(&mut self, source: &str) -> bool {
        if self.source == source {
            return false;
        }

        self.source = String::from(source);
        self.rules.clear();

        for text in source.split(',').map(str::trim).filter(|text| !text.is_empty()) {
            let rule = match text.parse::<SmartRule>() {
                Ok(rule) => rule,
                Err(e) => {
                    log::warn!("Skipping rule '{}': {}", text, e);
                    continue;
                }
            };
            if self.rules.push(rule).is_err() {
                log::warn!("Schedule holds more than {} rules, ignoring the rest", MAX_RULES);
                break;
            }
        }

        log::info!("Loaded {} smart rules", self.rules.len());
        true
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rules(&self) -> &[SmartRule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut [SmartRule] {
        &mut self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, rule) in self.rules.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_parse_rule() {
        let rule: SmartRule = "w=13;d=135;a=40;t=07:30;e=21:05;sunrise;any".parse().unwrap();

        assert!(rule.enabled);
        assert_eq!(rule.wing_mask, WingMask::from_digits(13));
        assert!(rule.days.contains(Weekday::Monday));
        assert!(!rule.days.contains(Weekday::Tuesday));
        assert!(rule.days.contains(Weekday::Friday));
        assert_eq!(rule.action, Some(40));
        assert_eq!(rule.at_time, Some(450));
        assert_eq!(rule.end_time, Some(1265));
        assert!(rule.at_sunrise);
        assert!(rule.any_required);
        assert!(rule.lifts());

        assert_eq!(rule.to_string(), "w=13;d=135;a=40;t=07:30;e=21:05;sunrise;any");
    }

    #[test]
    fn test_parse_defaults() {
        let rule: SmartRule = " off ; dusk ".parse().unwrap();

        assert!(!rule.enabled);
        assert_eq!(rule.wing_mask, WingMask::ALL);
        assert!(rule.days.is_every_day());
        assert!(rule.days.contains(Weekday::Sunday));
        assert_eq!(rule.to_string(), "off;dusk");
        assert_eq!("d=1234567;sunset".parse::<SmartRule>().unwrap().to_string(), "sunset");
    }

    #[test]
    fn test_reject_malformed_rule() {
        for text in [
            "a=40",
            "t=25:00",
            "t=0730",
            "a=140;dusk",
            "w=0;dusk",
            "d=8;dusk",
            "x=1;dusk",
            "noon",
        ] {
            assert_eq!(text.parse::<SmartRule>(), Err(Error::InvalidSchedule), "{}", text);
        }
    }

    #[test]
    fn test_rule_set_skips_bad_rules() {
        let rule_set = RuleSet::parse("sunset,bogus, t=08:00;a=0 ,,dawn;w=2");

        assert_eq!(rule_set.len(), 3);
        assert_eq!(rule_set.to_string(), "sunset,a=0;t=08:00,w=2;dawn");
    }

    #[test]
    fn test_rule_set_capacity() {
        let source = (0..20)
            .map(|minute| format!("t=10:{:02}", minute))
            .collect::<Vec<_>>()
            .join(",");
        let rule_set = RuleSet::parse(&source);

        assert_eq!(rule_set.len(), MAX_RULES);
        assert_eq!(rule_set.rules()[15].at_time, Some(615));
    }

    #[test]
    fn test_rebuild_only_on_change() {
        let mut rule_set = RuleSet::parse("sunset");
        rule_set.rules_mut()[0].last_fired = Some(42);

        assert!(!rule_set.rebuild("sunset"));
        assert_eq!(rule_set.rules()[0].last_fired, Some(42));

        assert!(rule_set.rebuild("sunset;a=50"));
        assert_eq!(rule_set.rules()[0].last_fired, None);
        assert!(rule_set.rebuild(""));
        assert!(rule_set.is_empty());
    }
}
