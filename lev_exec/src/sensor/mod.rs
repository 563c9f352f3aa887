//! # Distance sensor module
//!
//! Provides a unified interface over the distance sensor measuring the height of the levitated
//! object, so the control loop can be driven by real hardware or by a mock.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// [`DistanceSensor`] implementation for Linux Industrial I/O devices.
pub mod iio;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use iio::{IioDistanceSensor, IioSensorParams};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{io, path::PathBuf};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Trait to provide a unified API for reading the object height.
pub trait DistanceSensor {
    /// Take a reading.
    ///
    /// A reading above the object lost ceiling is valid and means no object is in range, it is
    /// not an error. Non-finite readings are errors.
    ///
    /// Units: millimeters
    fn read_mm(&mut self) -> Result<f64, SensorError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by a single reading. These are recoverable, the read is retried.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Could not read {0:?}: {1}")]
    Io(PathBuf, io::Error),

    #[error("Could not parse the raw reading {0:?}")]
    InvalidReading(String),

    #[error("Reading is not finite: {0}")]
    NotFinite(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: DistanceSensor + ?Sized> DistanceSensor for Box<T> {
    fn read_mm(&mut self) -> Result<f64, SensorError> {
        (**self).read_mm()
    }
}
