//! # Telemetry module
//!
//! Structures sent back to clients of the levitation executable, either in response to a command
//! or published periodically on the telemetry socket. Field names on the wire match those used by
//! the existing dashboard tooling.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Atomic snapshot of the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevStatus {
    /// Latest sensor sample, `None` before the first successful read.
    ///
    /// Units: millimeters
    #[serde(rename = "current_height")]
    pub current_height_mm: Option<f64>,

    /// False if the latest sample was above the object lost ceiling.
    pub object_detected: bool,

    /// Commanded target height.
    ///
    /// Units: millimeters
    #[serde(rename = "target_height")]
    pub target_height_mm: f64,

    /// Smoothed height the controller is currently tracking.
    ///
    /// Units: millimeters
    #[serde(rename = "ramped_height")]
    pub ramped_height_mm: f64,

    #[serde(rename = "pid_kp")]
    pub kp: f64,

    #[serde(rename = "pid_ki")]
    pub ki: f64,

    #[serde(rename = "pid_kd")]
    pub kd: f64,

    /// True if the active gains were set manually rather than by the scheduler.
    pub manual_gains: bool,

    pub integral_error: f64,

    /// `None` while there is no valid previous error, i.e. the derivative term is suppressed.
    pub previous_error: Option<f64>,

    /// Feedforward speed evaluated at the ramped height.
    pub feedforward_speed: f64,

    /// Last speed commanded to the fan.
    pub fan_speed: f64,

    #[serde(rename = "is_evaluating")]
    pub evaluating: bool,

    /// Accumulated absolute error of the current or last evaluation window.
    pub total_abs_error: f64,
}

/// A single row of the feedforward table as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FfEntry {
    pub index: usize,

    /// Units: millimeters
    pub height_mm: f64,

    /// Fan speed fraction in [0, 1]
    pub speed: f64,
}

/// Result of a completed evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Time at which the window closed
    pub timestamp: DateTime<Utc>,

    /// Requested window length
    pub duration_ms: u64,

    /// Sum of the absolute error over all accumulated cycles
    pub total_abs_error: f64,

    /// Number of cycles which contributed to the total
    pub num_cycles: u64,

    /// Target height during the window
    pub target_height_mm: f64,

    /// Gains in force when the window closed
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Telemetry packet published on the telemetry socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmPacket {
    /// Number of control cycles executed so far
    pub cycle: u64,

    /// Seconds since the session started
    pub session_time_s: f64,

    pub status: LevStatus,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EvalResult {
    /// Mean absolute error per accumulated cycle, or `None` if no cycle was accumulated.
    pub fn mean_abs_error(&self) -> Option<f64> {
        if self.num_cycles == 0 {
            None
        }
        else {
            Some(self.total_abs_error / self.num_cycles as f64)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_wire_names() -> Result<(), serde_json::Error> {
        let status = LevStatus {
            current_height_mm: Some(243.0),
            object_detected: true,
            target_height_mm: 250.0,
            ramped_height_mm: 250.0,
            kp: 0.005,
            ki: 0.001,
            kd: 0.002,
            manual_gains: false,
            integral_error: 12.5,
            previous_error: None,
            feedforward_speed: 0.3,
            fan_speed: 0.41,
            evaluating: false,
            total_abs_error: 0.0,
        };

        let value = serde_json::to_value(&status)?;

        assert_eq!(value["current_height"], 243.0);
        assert_eq!(value["pid_kp"], 0.005);
        assert_eq!(value["is_evaluating"], false);
        assert!(value["previous_error"].is_null());

        Ok(())
    }

    #[test]
    fn test_mean_abs_error() {
        let mut res = EvalResult {
            timestamp: Utc::now(),
            duration_ms: 1000,
            total_abs_error: 100.0,
            num_cycles: 20,
            target_height_mm: 250.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
        };
        assert_eq!(res.mean_abs_error(), Some(5.0));

        res.num_cycles = 0;
        assert_eq!(res.mean_abs_error(), None);
    }
}
