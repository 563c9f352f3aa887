//! # Levitation Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;
use serde::Deserialize;

use comms_if::net::NetParams;

use crate::{fan::FanParams, lev_ctrl, sensor::IioSensorParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LevExecParams {

    /// Target period of one control cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Time to wait after a failed sensor read before trying again.
    ///
    /// Units: seconds
    pub sensor_retry_delay_s: f64,

    pub lev_ctrl: lev_ctrl::Params,

    pub sensor: IioSensorParams,

    pub fan: FanParams,

    pub net: NetParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LevExecParamsError {
    #[error("{0} must be a positive number of seconds, found {1}")]
    InvalidPeriod(&'static str, f64),

    #[error("tm_decimation must be at least 1")]
    InvalidDecimation,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LevExecParams {
    /// Check the timing and telemetry parameters. Controller parameters are checked when the
    /// controller is initialised.
    pub fn validate(&self) -> Result<(), LevExecParamsError> {
        let periods = [
            ("cycle_period_s", self.cycle_period_s),
            ("sensor_retry_delay_s", self.sensor_retry_delay_s),
        ];
        for &(name, value) in periods.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(LevExecParamsError::InvalidPeriod(name, value))
            }
        }

        if self.net.tm_decimation == 0 {
            return Err(LevExecParamsError::InvalidDecimation)
        }

        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_period_s)
    }

    pub fn sensor_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.sensor_retry_delay_s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
