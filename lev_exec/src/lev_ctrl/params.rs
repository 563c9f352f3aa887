//! Parameters structure for LevCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::LevCtrlInitError;
use crate::gain_sched::{GainProfile, FeedforwardProfile};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for levitation control.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {

    // ---- SETPOINT ----

    /// Target height used until the first tuning command.
    ///
    /// Units: millimeters
    pub initial_target_height_mm: f64,

    /// Targets below this height are raised to it.
    ///
    /// Units: millimeters
    pub min_target_height_mm: f64,

    /// Readings above this height mean the object is not detected.
    ///
    /// Units: millimeters
    pub object_lost_height_mm: f64,

    /// Maximum change of the ramped height in one cycle.
    ///
    /// Units: millimeters
    pub ramp_step_mm: f64,

    // ---- CALIBRATION ----

    /// If true the feedforward speed is added to the PID output.
    pub feedforward_enabled: bool,

    /// PID gains by height, ascending.
    pub gain_schedule: Vec<GainProfile>,

    /// Feedforward fan speed by height, ascending.
    pub feedforward: Vec<FeedforwardProfile>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the scalar parameters. The tables are checked when the schedule is built.
    pub fn validate(&self) -> Result<(), LevCtrlInitError> {
        let positive = [
            ("ramp_step_mm", self.ramp_step_mm),
            ("object_lost_height_mm", self.object_lost_height_mm),
        ];
        for &(name, value) in positive.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(LevCtrlInitError::InvalidParam(
                    name, format!("expected a positive value, found {}", value)
                ))
            }
        }

        if !self.min_target_height_mm.is_finite()
            || self.min_target_height_mm >= self.object_lost_height_mm
        {
            return Err(LevCtrlInitError::InvalidParam(
                "min_target_height_mm",
                format!(
                    "expected a value below object_lost_height_mm ({}), found {}",
                    self.object_lost_height_mm,
                    self.min_target_height_mm
                )
            ))
        }

        if !self.initial_target_height_mm.is_finite() {
            return Err(LevCtrlInitError::InvalidParam(
                "initial_target_height_mm",
                format!("expected a finite value, found {}", self.initial_target_height_mm)
            ))
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TEST HELPERS
// ---------------------------------------------------------------------------

/// Parameters used throughout the crate's tests.
#[cfg(test)]
pub(crate) fn test_params() -> Params {
    Params {
        initial_target_height_mm: 250.0,
        min_target_height_mm: 50.0,
        object_lost_height_mm: 8000.0,
        ramp_step_mm: 20.0,
        feedforward_enabled: true,
        gain_schedule: vec![
            GainProfile { height_mm: 100.0, kp: 0.002, ki: 0.0002, kd: 0.006 },
            GainProfile { height_mm: 200.0, kp: 0.004, ki: 0.0004, kd: 0.008 },
            GainProfile { height_mm: 300.0, kp: 0.004, ki: 0.0004, kd: 0.008 },
        ],
        feedforward: vec![
            FeedforwardProfile { height_mm: 50.0, speed: 0.35 },
            FeedforwardProfile { height_mm: 250.0, speed: 0.30 },
            FeedforwardProfile { height_mm: 450.0, speed: 0.30 },
        ],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(test_params().validate().is_ok());

        let mut p = test_params();
        p.object_lost_height_mm = f64::INFINITY;
        assert!(matches!(
            p.validate(),
            Err(LevCtrlInitError::InvalidParam("object_lost_height_mm", _))
        ));

        let mut p = test_params();
        p.min_target_height_mm = 9000.0;
        assert!(matches!(
            p.validate(),
            Err(LevCtrlInitError::InvalidParam("min_target_height_mm", _))
        ));

        let mut p = test_params();
        p.initial_target_height_mm = f64::NAN;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_deserialise() -> Result<(), util::params::LoadError> {
        let p: Params = util::params::parse(r#"
            initial_target_height_mm = 250.0
            min_target_height_mm = 50.0
            object_lost_height_mm = 8000.0
            ramp_step_mm = 5.0
            feedforward_enabled = true

            [[gain_schedule]]
            height_mm = 50.0
            kp = 0.00151456
            ki = 0.00020457
            kd = 0.00763392

            [[feedforward]]
            height_mm = 50.0
            speed = 0.35
        "#)?;

        assert_eq!(p.ramp_step_mm, 5.0);
        assert_eq!(p.gain_schedule[0].kd, 0.00763392);
        assert_eq!(p.feedforward.len(), 1);

        Ok(())
    }
}
