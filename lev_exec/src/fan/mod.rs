//! # Fan driver module
//!
//! This module provides a unified fan speed interface which can abstract over different types of
//! PWM outputs.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// [`FanDriver`] implementation for the Linux sysfs PWM class.
pub mod sysfs_pwm;

/// [`FanDriver`] implementation for the PCA9685 16 channel PWM driver board.
pub mod pca9685;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use sysfs_pwm::{SysfsPwmFan, SysfsPwmParams};
pub use self::pca9685::{Pca9685Fan, Pca9685Params};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{io, path::PathBuf};
use serde::Deserialize;

use crate::device::DeviceError;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Trait to provide a unified API for driving the fan.
pub trait FanDriver {
    /// Set the fan speed.
    ///
    /// ## Arguments
    /// - `fraction` - The speed to set, between 0.0 (stopped) and 1.0 (full speed). Values outside
    ///   this range are rejected with [`FanError::InvalidSpeed`].
    fn set_speed(&mut self, fraction: f64) -> Result<(), FanError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Fan driver selection and settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum FanParams {
    Sysfs(SysfsPwmParams),
    Pca9685(Pca9685Params),
}

#[derive(Debug, thiserror::Error)]
pub enum FanError {
    #[error("Fan speed must be between 0.0 and 1.0, found {0}")]
    InvalidSpeed(f64),

    #[error("Could not write {0:?}: {1}")]
    Io(PathBuf, io::Error),

    #[error("An I2C error occured: {0}")]
    I2c(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: FanDriver + ?Sized> FanDriver for Box<T> {
    fn set_speed(&mut self, fraction: f64) -> Result<(), FanError> {
        (**self).set_speed(fraction)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Open the fan driver selected in the parameters.
pub fn open(params: &FanParams) -> Result<Box<dyn FanDriver + Send>, DeviceError> {
    match params {
        FanParams::Sysfs(p) => Ok(Box::new(SysfsPwmFan::open(p)?)),
        FanParams::Pca9685(p) => pca9685::open_rpi(p)
    }
}

/// Check a speed fraction is in range.
pub(crate) fn check_speed(fraction: f64) -> Result<(), FanError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(())
    }
    else {
        Err(FanError::InvalidSpeed(fraction))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
