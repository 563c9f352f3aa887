//! [`DistanceSensor`] implementation reading a Linux Industrial I/O channel.
//!
//! The VL53L0X time of flight sensor is exposed by the kernel as an IIO device whose
//! `in_distance_raw` attribute holds the range in millimeters. Out of range readings are reported
//! as 8190 or 8191.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{fs, path::PathBuf};
use log::{debug, info};
use serde::Deserialize;

use super::{DistanceSensor, SensorError};
use crate::device::{DeviceError, read_attr};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters locating the sensor's IIO channel.
#[derive(Debug, Clone, Deserialize)]
pub struct IioSensorParams {
    /// Root of the IIO device tree
    #[serde(default = "default_iio_root")]
    pub iio_root: PathBuf,

    /// Contents of the device's `name` attribute, e.g. `"vl53l0x"`
    pub device_name: String,

    /// Channel attribute holding the raw reading
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Factor from the raw reading to millimeters
    #[serde(default = "default_scale")]
    pub scale_to_mm: f64,
}

/// Distance sensor backed by an IIO channel file.
#[derive(Debug)]
pub struct IioDistanceSensor {
    channel_path: PathBuf,
    scale_to_mm: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl IioDistanceSensor {
    /// Find the IIO device with the configured name and open its channel.
    pub fn open(params: &IioSensorParams) -> Result<Self, DeviceError> {
        if !(params.scale_to_mm.is_finite() && params.scale_to_mm > 0.0) {
            return Err(DeviceError::InvalidConfig(format!(
                "scale_to_mm must be positive, found {}", params.scale_to_mm
            )))
        }

        let entries = fs::read_dir(&params.iio_root)
            .map_err(|e| DeviceError::Io(params.iio_root.clone(), e))?;

        for entry in entries.filter_map(|e| e.ok()) {
            let dev_path = entry.path();

            let name = match read_attr(&dev_path.join("name")) {
                Ok(n) => n,
                Err(_) => continue
            };
            debug!("Found IIO device {:?} named {:?}", dev_path, name);

            if name != params.device_name {
                continue
            }

            let channel_path = dev_path.join(&params.channel);
            if !channel_path.exists() {
                return Err(DeviceError::NotFound(format!(
                    "{} has no {} channel", params.device_name, params.channel
                )))
            }

            info!("Distance sensor {} opened at {:?}", params.device_name, channel_path);

            return Ok(Self {
                channel_path,
                scale_to_mm: params.scale_to_mm
            })
        }

        Err(DeviceError::NotFound(format!(
            "no IIO device named {} under {:?}", params.device_name, params.iio_root
        )))
    }
}

impl DistanceSensor for IioDistanceSensor {
    fn read_mm(&mut self) -> Result<f64, SensorError> {
        let raw = read_attr(&self.channel_path)
            .map_err(|e| SensorError::Io(self.channel_path.clone(), e))?;

        let value = raw.parse::<f64>()
            .map_err(|_| SensorError::InvalidReading(raw.clone()))?;

        let height_mm = value * self.scale_to_mm;
        if !height_mm.is_finite() {
            return Err(SensorError::NotFinite(height_mm))
        }

        Ok(height_mm)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_iio_root() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices")
}

fn default_channel() -> String {
    "in_distance_raw".into()
}

fn default_scale() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
