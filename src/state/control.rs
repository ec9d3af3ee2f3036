use thiserror::Error;

use crate::defs::FanSpeed;

pub const THRESHOLD_RANGE_F: (f32, f32) = (-50.0, 200.0);
pub const DURATION_RANGE_MIN: (u32, u32) = (1, 59);

/// Operator-facing control knobs plus the last observed actuation outputs.
///
/// The observed [`Outputs`] are written only by the policy engine; every
/// other field is written through protocol commands and read by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    fan_threshold_f: f32,
    on_duration_min: u32,

    pub force_recording: bool,
    pub force_fan: bool,
    pub fan_speed: FanSpeed,

    pub outputs: Outputs,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    pub recording_active: bool,
    pub fan_active: bool,
    pub fan_speed_level: FanSpeed,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("threshold {0} °F outside the accepted range")]
    Threshold(f32),

    #[error("on-duration {0} min outside the accepted range")]
    Duration(u32),
}

impl ControlState {
    pub fn new(fan_threshold_f: f32, on_duration_min: u32) -> Self {
        Self {
            fan_threshold_f,
            on_duration_min,
            force_recording: false,
            force_fan: false,
            fan_speed: FanSpeed::default(),
            outputs: Outputs::default(),
        }
    }

    pub fn fan_threshold(&self) -> f32 {
        self.fan_threshold_f
    }

    pub fn on_duration(&self) -> u32 {
        self.on_duration_min
    }

    /// Rejects values outside the sane range, keeping the prior threshold.
    pub fn set_fan_threshold(&mut self, value: f32) -> Result<(), ValidationError> {
        let (min, max) = THRESHOLD_RANGE_F;

        if !value.is_finite() || value < min || value > max {
            return Err(ValidationError::Threshold(value));
        }

        self.fan_threshold_f = value;
        Ok(())
    }

    /// Rejects durations that would spill past the trigger hour.
    pub fn set_on_duration(&mut self, minutes: u32) -> Result<(), ValidationError> {
        let (min, max) = DURATION_RANGE_MIN;

        if !(min..=max).contains(&minutes) {
            return Err(ValidationError::Duration(minutes));
        }

        self.on_duration_min = minutes;
        Ok(())
    }
}
