use crate::calendar::{LocalTime, minute_crossed, within_window};
use crate::types::WingMask;

use super::rule::{MAX_RULES, RuleSet, SmartRule};

/// Seconds a rule stays quiet after firing.
pub const RULE_COOLDOWN_S: u64 = 60;

/// Everything the rules look at during one evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomationInputs {
    pub uptime_s: u64,
    pub local: Option<LocalTime>,
    /// Logical twilight flipped during this pass: `Some(true)` on dusk.
    pub twilight_edge: Option<bool>,
    pub twilight: bool,
    pub lock: bool,
    /// Sunset plus the dusk delay, when the calendar is known.
    pub sunset_minute: Option<u16>,
    /// Sunrise plus the dawn delay, when the calendar is known.
    pub sunrise_minute: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Sunset,
    Dusk,
    Sunrise,
    Dawn,
    AtTime,
    EndTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleFiring {
    pub rule: usize,
    pub trigger: Trigger,
    pub wing_mask: WingMask,
    pub percent: u8,
}

pub type RuleFirings = heapless::Vec<RuleFiring, MAX_RULES>;

/// Evaluates the rule set against the clock, the solar calendar and the light
/// sensor. Holds the last evaluated minute so clock events fire once even if
/// passes are skipped while the wings are moving.
#[derive(Debug, Default)]
pub struct RuleEngine {
    last_minute: Option<u16>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rules that fired, in rule order. Applying them in order
    /// lets the last one win.
    pub fn evaluate(&mut self, rules: &mut RuleSet, inputs: &AutomationInputs) -> RuleFirings {
        let minute = inputs.local.map(|local| local.minute_of_day);
        let previous = match minute {
            Some(minute) => self.last_minute.replace(minute),
            None => {
                self.last_minute = None;
                None
            }
        };

        let mut firings = RuleFirings::new();
        for (index, rule) in rules.rules_mut().iter_mut().enumerate() {
            if !rule.enabled {
                continue;
            }
            if !rule.days.is_every_day() {
                match inputs.local {
                    Some(local) if rule.days.contains(local.weekday()) => {}
                    _ => continue,
                }
            }
            if let Some(last_fired) = rule.last_fired {
                if inputs.uptime_s.saturating_sub(last_fired) < RULE_COOLDOWN_S {
                    continue;
                }
            }

            let Some(trigger) = fresh_trigger(rule, inputs, previous, minute) else {
                continue;
            };
            if !rule.any_required && !conditions_hold(rule, inputs, minute, trigger) {
                continue;
            }

            rule.last_fired = Some(inputs.uptime_s);
            let percent = rule.action.unwrap_or_else(|| default_percent(rule, trigger));
            log::info!(
                "Smart rule {} fired on {:?}: wings {} to {}%",
                index + 1,
                trigger,
                rule.wing_mask,
                percent
            );
            // Capacity matches the rule set, so this never overflows.
            let _ = firings.push(RuleFiring {
                rule: index,
                trigger,
                wing_mask: rule.wing_mask,
                percent,
            });
        }
        firings
    }
}

fn crossed(previous: Option<u16>, minute: Option<u16>, target: Option<u16>) -> bool {
    match (minute, target) {
        (Some(minute), Some(target)) => minute_crossed(previous, minute, target),
        _ => false,
    }
}

/// First trigger of `rule` that became true during this pass.
fn fresh_trigger(
    rule: &SmartRule,
    inputs: &AutomationInputs,
    previous: Option<u16>,
    minute: Option<u16>,
) -> Option<Trigger> {
    if rule.at_sunset && crossed(previous, minute, inputs.sunset_minute) {
        return Some(Trigger::Sunset);
    }
    if rule.at_dusk && inputs.twilight_edge == Some(true) {
        return Some(Trigger::Dusk);
    }
    if rule.at_sunrise && crossed(previous, minute, inputs.sunrise_minute) {
        return Some(Trigger::Sunrise);
    }
    if rule.at_dawn && inputs.twilight_edge == Some(false) && !inputs.lock {
        return Some(Trigger::Dawn);
    }
    if crossed(previous, minute, rule.at_time) {
        return Some(Trigger::AtTime);
    }
    // With a start time, the end time only bounds the window.
    if rule.at_time.is_none() && crossed(previous, minute, rule.end_time) {
        return Some(Trigger::EndTime);
    }
    None
}

/// Every configured trigger holds right now. The bound that `trigger` just
/// crossed is not checked again, a late pass may already be past it.
fn conditions_hold(
    rule: &SmartRule,
    inputs: &AutomationInputs,
    minute: Option<u16>,
    trigger: Trigger,
) -> bool {
    if rule.at_time.is_some() || rule.end_time.is_some() {
        let Some(minute) = minute else {
            return false;
        };
        let in_window = match (rule.at_time, rule.end_time) {
            (Some(start), Some(end)) => within_window(minute, start, end),
            (Some(start), None) => trigger == Trigger::AtTime || minute >= start,
            (None, Some(end)) => trigger == Trigger::EndTime || minute <= end,
            (None, None) => true,
        };
        if !in_window {
            return false;
        }
    }

    if rule.at_sunset || rule.at_sunrise {
        let (Some(minute), Some(sunset), Some(sunrise)) =
            (minute, inputs.sunset_minute, inputs.sunrise_minute)
        else {
            return false;
        };
        if rule.at_sunset && !within_window(minute, sunset, sunrise) {
            return false;
        }
        if rule.at_sunrise && !within_window(minute, sunrise, sunset) {
            return false;
        }
    }
    if rule.at_dusk && !inputs.twilight {
        return false;
    }
    if rule.at_dawn && (inputs.twilight || inputs.lock) {
        return false;
    }
    true
}

fn default_percent(rule: &SmartRule, trigger: Trigger) -> u8 {
    let lift = match trigger {
        Trigger::Sunset | Trigger::Dusk => false,
        Trigger::Sunrise | Trigger::Dawn => true,
        Trigger::AtTime => rule.lifts(),
        Trigger::EndTime => !rule.lifts(),
    };
    if lift { 0 } else { 100 }
}
