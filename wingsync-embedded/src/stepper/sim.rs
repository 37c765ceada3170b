use super::{Direction, MotorPort};
use crate::types::WING_COUNT;

/// In-memory driver used by tests and the host simulation. Tracks what the
/// physical wings would have done with the pulses they received.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMotor {
    pub enabled: [bool; WING_COUNT],
    pub direction: Option<Direction>,
    /// Physical offset of each wing, in pulses toward the closed end.
    pub positions: [i64; WING_COUNT],
    pub pulses: u64,
    pub releases: u64,
    reversed: bool,
}

impl SimulatedMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets the direction line with the given motor polarity.
    pub fn with_polarity(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn is_energized(&self) -> bool {
        self.enabled.iter().any(|&enabled| enabled)
    }
}

impl MotorPort for SimulatedMotor {
    fn set(&mut self, wing: usize, enabled: bool, direction: Direction) {
        if wing >= WING_COUNT {
            return;
        }
        self.enabled[wing] = enabled;
        if enabled {
            self.direction = Some(direction);
        }
    }

    fn pulse(&mut self) {
        self.pulses += 1;
        let Some(direction) = self.direction else {
            return;
        };
        let delta = if (direction == Direction::Clockwise) != self.reversed {
            1
        } else {
            -1
        };
        for (position, _) in self
            .positions
            .iter_mut()
            .zip(self.enabled.iter())
            .filter(|(_, enabled)| **enabled)
        {
            *position += delta;
        }
    }

    fn release(&mut self) {
        self.enabled = [false; WING_COUNT];
        self.direction = None;
        self.releases += 1;
    }
}
