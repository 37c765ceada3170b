use crate::error::{Error, Result};
use crate::stepper::{Direction, MotorPort, is_independent};
use crate::types::{WING_COUNT, WingMask};

use super::state::{DeviceState, Mode};

/// Fine adjustment of the travel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRequest {
    /// Pulses; half of it is applied.
    pub delta: i32,
    pub wings: WingMask,
    /// Allow calibrating while wings are moving.
    pub bypass: bool,
    /// Shift the position regardless of where the wing stands.
    pub positioning: bool,
}

impl DeviceState {
    fn independent(&self, mask: WingMask) -> WingMask {
        let mut selected = WingMask::NONE;
        for index in mask.iter().filter(|&index| is_independent(&self.flags, index)) {
            selected.insert(index);
        }
        selected
    }

    /// Starts counting pulses on the selected wings. Every selected wing must
    /// be at rest.
    pub fn start_measurement(&mut self, wings: WingMask) -> Result<()> {
        if self.is_measuring() {
            return Err(Error::MeasurementActive);
        }
        let selected = self.independent(wings);
        if selected.is_empty() {
            return Err(Error::NoWingSelected);
        }
        if selected.iter().any(|index| !self.wings[index].is_idle()) {
            return Err(Error::MotionInProgress);
        }

        self.mode = Mode::Measuring(selected);
        log::info!("Measurement started on wings {}", selected);
        Ok(())
    }

    /// Advances every measured wing by one pulse.
    pub fn measurement_tick<M: MotorPort>(&mut self, motor: &mut M) {
        let Mode::Measuring(selected) = self.mode else {
            return;
        };

        let direction = Direction::for_travel(true, self.flags.reversed);
        for index in 0..WING_COUNT {
            let enabled =
                selected.contains(index) || (self.flags.tandem && index == 1 && selected.contains(0));
            motor.set(index, enabled, direction);
        }
        motor.pulse();

        for index in selected.iter() {
            self.wings[index].actual += 1;
        }
        if self.flags.tandem {
            self.wings[1].actual = self.wings[0].actual;
        }
    }

    /// Drops the measurement. Positions counted so far stay in `actual`.
    pub fn cancel_measurement<M: MotorPort>(&mut self, motor: &mut M) -> Result<()> {
        let Mode::Measuring(selected) = self.mode else {
            return Err(Error::MeasurementInactive);
        };

        self.mode = Mode::Normal;
        motor.release();
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            wing.destination = wing.actual;
        }
        self.mirror();
        log::info!("Measurement cancelled");
        Ok(())
    }

    /// Commits the counted pulses as the full travel of each measured wing.
    pub fn end_measurement<M: MotorPort>(&mut self, motor: &mut M) -> Result<WingMask> {
        let Mode::Measuring(selected) = self.mode else {
            return Err(Error::MeasurementInactive);
        };

        self.mode = Mode::Normal;
        motor.release();
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            wing.steps = wing.actual.max(0) as u32;
            wing.destination = wing.actual;
            log::info!("Measured wing {}: {} steps", index + 1, wing.steps);
        }
        self.mirror();
        Ok(selected)
    }

    /// Shifts the dead band at the open end or extends the travel at the
    /// closed end. Issues no pulses; the sequencer picks up any new target.
    /// Returns `true` when `steps` changed.
    pub fn calibrate(&mut self, request: &CalibrationRequest) -> Result<bool> {
        if !request.bypass && !self.is_converged() {
            return Err(Error::MotionInProgress);
        }
        let selected = self.addressable(request.wings);
        if selected.is_empty() {
            return Err(Error::NoWingSelected);
        }

        let half = request.delta / 2;
        let mut steps_changed = false;
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            if wing.actual == 0 || request.positioning {
                wing.actual = wing.actual.saturating_sub(half);
                log::info!("Calibration: wing {} shifted by {}", index + 1, request.delta);
            } else if wing.actual == wing.travel() {
                wing.steps = wing.travel().saturating_add(half).max(0) as u32;
                wing.destination = wing.travel();
                steps_changed = true;
                log::info!(
                    "Calibration: wing {} extended by {}, steps set at {}",
                    index + 1,
                    request.delta,
                    wing.steps
                );
            }
        }
        self.mirror();
        Ok(steps_changed)
    }

    /// Slack compensation for wings leaving the fully closed position toward
    /// fully open. Call once whenever new destinations are set.
    pub fn prepare_motion(&mut self) {
        for index in 0..WING_COUNT {
            if !is_independent(&self.flags, index) {
                continue;
            }
            let wing = &mut self.wings[index];
            if !wing.installed() || wing.is_idle() {
                continue;
            }
            if wing.actual == wing.travel() && wing.destination == 0 {
                wing.actual = wing.actual.saturating_add(wing.fixit);
                wing.cycles += 1;
                if self.flags.tandem {
                    self.wings[1].cycles += 1;
                }
            }
        }
        self.mirror();

        for (index, wing) in self.wings.iter().enumerate() {
            if is_independent(&self.flags, index) && wing.installed() && !wing.is_idle() {
                log::info!(
                    "Movement: wing {} by {} steps to {}%",
                    index + 1,
                    wing.destination - wing.actual,
                    wing.destination_percent()
                );
            }
        }
    }

    /// Declares the selected wings fully open where they stand.
    pub fn set_min(&mut self, wings: WingMask) -> WingMask {
        let selected = self.addressable(wings);
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            wing.destination = 0;
            wing.actual = 0;
        }
        self.mirror();
        selected
    }

    /// Declares the selected wings fully closed where they stand.
    pub fn set_max(&mut self, wings: WingMask) -> WingMask {
        let selected = self.addressable(wings);
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            wing.destination = wing.travel();
            wing.actual = wing.travel();
        }
        self.mirror();
        selected
    }

    /// Takes the current position of the selected wings as their full travel.
    pub fn set_as_max(&mut self, wings: WingMask) -> WingMask {
        let selected = self.addressable(wings);
        for index in selected.iter() {
            let wing = &mut self.wings[index];
            wing.steps = wing.actual.max(0) as u32;
            wing.destination = wing.actual;
        }
        self.mirror();
        selected
    }
}
