//! [`FanDriver`] implementation for the Linux sysfs PWM class

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{path::PathBuf, thread, time::Duration};
use log::info;
use serde::Deserialize;

use super::{FanDriver, FanError, check_speed};
use util::maths::lin_map;
use crate::device::{DeviceError, write_attr};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of times to wait for udev to create the channel directory after exporting it.
const EXPORT_POLLS: usize = 10;

const EXPORT_POLL_PERIOD: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a sysfs PWM channel.
#[derive(Debug, Clone, Deserialize)]
pub struct SysfsPwmParams {
    /// Root of the PWM class tree
    #[serde(default = "default_pwm_root")]
    pub pwm_root: PathBuf,

    /// Index of the `pwmchipN` device
    pub chip: u32,

    /// Channel on the chip
    pub channel: u32,

    /// PWM period.
    ///
    /// Units: nanoseconds
    pub period_ns: u64,
}

/// A fan driven by one sysfs PWM channel.
#[derive(Debug)]
pub struct SysfsPwmFan {
    duty_cycle_path: PathBuf,
    period_ns: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SysfsPwmFan {
    /// Export and enable the channel, leaving the fan stopped.
    pub fn open(params: &SysfsPwmParams) -> Result<Self, DeviceError> {
        if params.period_ns == 0 {
            return Err(DeviceError::InvalidConfig("period_ns must be non-zero".into()))
        }

        let chip_path = params.pwm_root.join(format!("pwmchip{}", params.chip));
        if !chip_path.exists() {
            return Err(DeviceError::NotFound(format!("PWM chip {:?}", chip_path)))
        }

        let channel_path = chip_path.join(format!("pwm{}", params.channel));
        if !channel_path.exists() {
            let export_path = chip_path.join("export");
            write_attr(&export_path, params.channel)
                .map_err(|e| DeviceError::Io(export_path, e))?;

            let mut polls = 0;
            while !channel_path.exists() {
                if polls == EXPORT_POLLS {
                    return Err(DeviceError::NotFound(format!(
                        "PWM channel {:?} did not appear after export", channel_path
                    )))
                }
                thread::sleep(EXPORT_POLL_PERIOD);
                polls += 1;
            }
        }

        // Duty cycle first, the kernel rejects a period shorter than the current duty cycle
        let attrs = [
            ("duty_cycle", 0),
            ("period", params.period_ns),
            ("enable", 1),
        ];
        for &(attr, value) in attrs.iter() {
            let path = channel_path.join(attr);
            write_attr(&path, value).map_err(|e| DeviceError::Io(path, e))?;
        }

        info!("Fan PWM opened at {:?}", channel_path);

        Ok(Self {
            duty_cycle_path: channel_path.join("duty_cycle"),
            period_ns: params.period_ns
        })
    }
}

impl FanDriver for SysfsPwmFan {
    fn set_speed(&mut self, fraction: f64) -> Result<(), FanError> {
        check_speed(fraction)?;

        let duty_ns = lin_map((0.0, 1.0), (0.0, self.period_ns as f64), fraction).round() as u64;

        write_attr(&self.duty_cycle_path, duty_ns)
            .map_err(|e| FanError::Io(self.duty_cycle_path.clone(), e))
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_pwm_root() -> PathBuf {
    PathBuf::from("/sys/class/pwm")
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
