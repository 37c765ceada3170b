use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::{Direction, MotorPort};
use crate::types::WING_COUNT;

/// Step pulse period in milliseconds.
pub const PULSE_PERIOD_MS: u32 = 4;

/// Drives the bipolar driver chips: active-low enable lines, one direction
/// line and one step line shared by all wings.
pub struct PinMotor<Pin, Delay>
where
    Pin: OutputPin,
    Delay: DelayNs,
{
    enable_pins: [Pin; WING_COUNT],
    dir_pin: Pin,
    step_pin: Pin,
    delay: Delay,
    pulse_period_ms: u32,
}

impl<Pin, Delay> PinMotor<Pin, Delay>
where
    Pin: OutputPin,
    Delay: DelayNs,
{
    pub fn new(enable_pins: [Pin; WING_COUNT], dir_pin: Pin, step_pin: Pin, delay: Delay) -> Self {
        let mut motor = Self {
            enable_pins,
            dir_pin,
            step_pin,
            delay,
            pulse_period_ms: PULSE_PERIOD_MS,
        };
        motor.release();
        motor
    }

    pub fn with_pulse_period(mut self, pulse_period_ms: u32) -> Self {
        self.pulse_period_ms = pulse_period_ms;
        self
    }

    fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Clockwise => self.dir_pin.set_high().ok(),
            Direction::CounterClockwise => self.dir_pin.set_low().ok(),
        };
    }
}

impl<Pin, Delay> MotorPort for PinMotor<Pin, Delay>
where
    Pin: OutputPin,
    Delay: DelayNs,
{
    fn set(&mut self, wing: usize, enabled: bool, direction: Direction) {
        let Some(enable_pin) = self.enable_pins.get_mut(wing) else {
            return;
        };
        if !enabled {
            enable_pin.set_high().ok();
            return;
        }
        enable_pin.set_low().ok();
        self.set_direction(direction);
    }

    fn pulse(&mut self) {
        self.step_pin.set_high().ok();
        self.step_pin.set_low().ok();
        self.delay.delay_ms(self.pulse_period_ms);
    }

    fn release(&mut self) {
        for pin in self.enable_pins.iter_mut() {
            pin.set_high().ok();
        }
        self.dir_pin.set_low().ok();
        self.step_pin.set_low().ok();
    }
}
