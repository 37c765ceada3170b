mod pin_motor;
mod sequencer;
mod sim;

pub use pin_motor::PinMotor;
pub use sequencer::*;
pub use sim::SimulatedMotor;

/// Level of the shared direction line, after motor polarity is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    /// Direction line for a wing travelling toward the closed end (`advancing`)
    /// or back toward the open end.
    pub fn for_travel(advancing: bool, reversed: bool) -> Self {
        if advancing != reversed {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        }
    }
}

/// Hardware seam for the driver chips: three enable lines, one shared
/// direction line and one shared step line.
pub trait MotorPort {
    fn set(&mut self, wing: usize, enabled: bool, direction: Direction);

    /// Issues a single step pulse of fixed width to every enabled driver.
    fn pulse(&mut self);

    /// De-energizes all drivers.
    fn release(&mut self);
}
