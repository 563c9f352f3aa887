//! Levitation control module
//!
//! Holds the controller state shared between the control loop and the tuning interface, and the
//! per-cycle processing: setpoint ramping, gain scheduling, PID with feedforward, and anti-windup.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

use crate::gain_sched::ScheduleError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during LevCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum LevCtrlInitError {
    #[error("Invalid schedule table: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Invalid parameter {0}: {1}")]
    InvalidParam(&'static str, String),
}

/// Possible errors that can occur during LevCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum LevCtrlError {
    #[error("LevCtrl has not been initialised")]
    NotInitialised,

    #[error("Invalid height reading: {0} mm")]
    InvalidHeight(f64),
}
