use super::{Direction, MotorPort};
use crate::types::{SequencingFlags, WING_COUNT, Wing, WingMask, WingState};

/// Result of a single sequencer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Wings that were enabled for this pulse.
    pub stepped: WingMask,
    /// All wings are idle after this tick and the drivers were released.
    pub converged: bool,
}

/// Order in which wings claim the shared direction line.
pub fn priority_order(flags: &SequencingFlags) -> [usize; WING_COUNT] {
    if flags.inverted_sequence {
        [2, 1, 0]
    } else {
        [0, 1, 2]
    }
}

/// Whether the wing at `index` is driven on its own. Under tandem only wing 1
/// is; wing 2 follows it and wing 3 is unused.
pub fn is_independent(flags: &SequencingFlags, index: usize) -> bool {
    !flags.tandem || index == 0
}

pub fn all_idle(wings: &[Wing; WING_COUNT], flags: &SequencingFlags) -> bool {
    (0..WING_COUNT)
        .filter(|&index| is_independent(flags, index))
        .all(|index| wings[index].is_idle())
}

/// Copies wing 1 onto wing 2 when running in tandem.
pub fn mirror_tandem(wings: &mut [Wing; WING_COUNT], flags: &SequencingFlags) {
    if flags.tandem {
        wings[1].steps = wings[0].steps;
        wings[1].destination = wings[0].destination;
        wings[1].actual = wings[0].actual;
    }
}

/// Wings allowed to step on this tick.
///
/// A moving wing steps when every wing ahead of it in priority order is idle
/// or, unless `separately` is set, travelling the same way. This keeps all
/// enabled wings on a single direction line level.
pub fn eligible_wings(wings: &[Wing; WING_COUNT], flags: &SequencingFlags) -> WingMask {
    let order = priority_order(flags);
    let mut eligible = WingMask::NONE;

    for (position, &index) in order.iter().enumerate() {
        if !is_independent(flags, index) || wings[index].is_idle() {
            continue;
        }
        let travel = wings[index].state();
        let unblocked = order[..position]
            .iter()
            .filter(|&&ahead| is_independent(flags, ahead))
            .all(|&ahead| {
                let state = wings[ahead].state();
                state == WingState::Idle || (!flags.separately && state == travel)
            });
        if unblocked {
            eligible.insert(index);
        }
    }

    eligible
}

/// Advances the eligible wings by exactly one pulse.
///
/// Eligibility is decided on the positions at the start of the tick. Open
/// loop: `actual` is updated for every enabled wing whether or not the motor
/// moved.
pub fn tick<M: MotorPort>(
    wings: &mut [Wing; WING_COUNT],
    flags: &SequencingFlags,
    motor: &mut M,
) -> TickOutcome {
    let eligible = eligible_wings(wings, flags);

    let Some(lead) = eligible.iter().next() else {
        let converged = all_idle(wings, flags);
        if converged {
            motor.release();
        }
        return TickOutcome {
            stepped: WingMask::NONE,
            converged,
        };
    };

    let advancing = wings[lead].state() == WingState::Advancing;
    let direction = Direction::for_travel(advancing, flags.reversed);

    for index in 0..WING_COUNT {
        let enabled = eligible.contains(index)
            || (flags.tandem && index == 1 && eligible.contains(0));
        motor.set(index, enabled, direction);
    }
    motor.pulse();

    for index in eligible.iter() {
        let wing = &mut wings[index];
        if wing.destination > wing.actual {
            wing.actual += 1;
        } else {
            wing.actual -= 1;
        }
    }
    mirror_tandem(wings, flags);

    let converged = all_idle(wings, flags);
    if converged {
        motor.release();
    }

    TickOutcome {
        stepped: eligible,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::SimulatedMotor;

    fn wings(steps: [u32; 3], destination: [i32; 3], actual: [i32; 3]) -> [Wing; 3] {
        core::array::from_fn(|index| Wing {
            steps: steps[index],
            destination: destination[index],
            actual: actual[index],
            ..Default::default()
        })
    }

    fn run_to_idle(
        wings: &mut [Wing; 3],
        flags: &SequencingFlags,
        motor: &mut SimulatedMotor,
        mut observe: impl FnMut(&[Wing; 3], &TickOutcome),
    ) -> usize {
        let mut ticks = 0;
        while !all_idle(wings, flags) {
            let outcome = tick(wings, flags, motor);
            observe(wings, &outcome);
            ticks += 1;
            assert!(ticks < 10_000, "Sequencer failed to converge");
        }
        ticks
    }

    #[test]
    fn test_lockstep_never_passes_primary() {
        let mut wings = wings([100, 100, 0], [100, 100, 0], [0, 0, 0]);
        let flags = SequencingFlags::default();
        let mut motor = SimulatedMotor::new();

        let ticks = run_to_idle(&mut wings, &flags, &mut motor, |wings, _| {
            assert!(wings[1].actual <= wings[0].actual);
        });

        assert_eq!(ticks, 100);
        assert_eq!(wings[0].actual, 100);
        assert_eq!(wings[1].actual, 100);
        assert_eq!(motor.positions, [100, 100, 0]);
        assert!(!motor.is_energized());
    }

    #[test]
    fn test_separately_moves_one_wing_at_a_time() {
        let mut wings = wings([50, 50, 50], [50, 50, 50], [0, 0, 0]);
        let flags = SequencingFlags {
            separately: true,
            ..Default::default()
        };
        let mut motor = SimulatedMotor::new();

        let ticks = run_to_idle(&mut wings, &flags, &mut motor, |wings, outcome| {
            assert_eq!(outcome.stepped.iter().count(), 1);
            if wings[1].actual > 0 {
                assert_eq!(wings[0].actual, 50);
            }
            if wings[2].actual > 0 {
                assert_eq!(wings[1].actual, 50);
            }
        });

        assert_eq!(ticks, 150);
    }

    #[test]
    fn test_inverted_sequence_leads_with_wing_three() {
        let mut wings = wings([50, 50, 50], [50, 50, 50], [0, 0, 0]);
        let flags = SequencingFlags {
            separately: true,
            inverted_sequence: true,
            ..Default::default()
        };
        let mut motor = SimulatedMotor::new();

        let outcome = tick(&mut wings, &flags, &mut motor);
        assert_eq!(outcome.stepped, WingMask::single(2));

        run_to_idle(&mut wings, &flags, &mut motor, |wings, _| {
            if wings[0].actual > 0 {
                assert_eq!(wings[1].actual, 50);
                assert_eq!(wings[2].actual, 50);
            }
        });
    }

    #[test]
    fn test_opposite_travel_waits_for_primary() {
        let mut wings = wings([100, 100, 0], [10, 0, 0], [0, 10, 0]);
        let flags = SequencingFlags::default();
        let mut motor = SimulatedMotor::new();

        let mut retreat_started_at = None;
        let mut tick_count = 0;
        run_to_idle(&mut wings, &flags, &mut motor, |wings, outcome| {
            tick_count += 1;
            if outcome.stepped.contains(1) && retreat_started_at.is_none() {
                retreat_started_at = Some(tick_count);
                assert_eq!(wings[0].actual, 10);
            }
            assert!(!(outcome.stepped.contains(0) && outcome.stepped.contains(1)));
        });

        assert_eq!(retreat_started_at, Some(11));
        assert_eq!(motor.positions, [10, -10, 0]);
    }

    #[test]
    fn test_actual_is_monotonic() {
        let mut wings = wings([80, 80, 80], [80, 0, 40], [0, 80, 60]);
        let flags = SequencingFlags::default();
        let mut motor = SimulatedMotor::new();
        let start = wings;

        let mut previous = wings;
        run_to_idle(&mut wings, &flags, &mut motor, |wings, _| {
            for index in 0..3 {
                let forward = start[index].destination >= start[index].actual;
                if forward {
                    assert!(wings[index].actual >= previous[index].actual);
                    assert!(wings[index].actual <= wings[index].destination);
                } else {
                    assert!(wings[index].actual <= previous[index].actual);
                    assert!(wings[index].actual >= wings[index].destination);
                }
            }
            previous = *wings;
        });

        assert_eq!(motor.positions, [80, -80, -20]);
    }

    #[test]
    fn test_tandem_mirrors_wing_one() {
        let mut wings = wings([60, 60, 0], [60, 0, 0], [0, 0, 0]);
        let flags = SequencingFlags {
            tandem: true,
            ..Default::default()
        };
        let mut motor = SimulatedMotor::new();

        run_to_idle(&mut wings, &flags, &mut motor, |wings, outcome| {
            assert_eq!(wings[1].actual, wings[0].actual);
            assert!(!outcome.stepped.contains(1));
        });

        assert_eq!(motor.positions, [60, 60, 0]);
    }

    #[test]
    fn test_direction_follows_polarity() {
        let mut wings = wings([10, 0, 0], [5, 0, 0], [0, 0, 0]);
        let flags = SequencingFlags {
            reversed: true,
            ..Default::default()
        };
        let mut motor = SimulatedMotor::new().with_polarity(true);

        tick(&mut wings, &flags, &mut motor);
        assert_eq!(motor.direction, Some(Direction::CounterClockwise));

        run_to_idle(&mut wings, &flags, &mut motor, |_, _| {});
        assert_eq!(motor.positions, [5, 0, 0]);
    }

    #[test]
    fn test_idle_tick_releases_without_pulse() {
        let mut wings = wings([10, 0, 0], [5, 0, 0], [5, 0, 0]);
        let flags = SequencingFlags::default();
        let mut motor = SimulatedMotor::new();

        let outcome = tick(&mut wings, &flags, &mut motor);

        assert!(outcome.converged);
        assert!(outcome.stepped.is_empty());
        assert_eq!(motor.pulses, 0);
        assert_eq!(motor.releases, 1);
    }
}
