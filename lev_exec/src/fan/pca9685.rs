//! [`FanDriver`] implementation for the PCA9685 driver

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use pwm_pca9685::{Channel, Pca9685};
use embedded_hal::blocking::i2c::{Write, WriteRead};
use serde::Deserialize;

use super::{FanDriver, FanError, check_speed};
use crate::device::DeviceError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of counter steps in one PWM period.
const MAX_PWM: u16 = 4096;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a fan on a PCA9685 board.
#[derive(Debug, Clone, Deserialize)]
pub struct Pca9685Params {
    /// I2C bus number the board is attached to
    pub i2c_bus: u8,

    /// I2C address of the board, `0x40` unless the address pins are soldered
    pub address: u8,

    /// Output channel, 0 to 15
    pub channel: u8,
}

/// A fan driven by one channel of a PCA9685 board.
pub struct Pca9685Fan<I2C> {
    pca: Pca9685<I2C>,
    channel: Channel,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<I2C, E> Pca9685Fan<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: std::fmt::Debug
{
    /// Enable the board and stop the fan.
    pub fn new(mut pca: Pca9685<I2C>, channel: u8) -> Result<Self, DeviceError> {
        let channel = channel_from_index(channel).ok_or_else(|| DeviceError::InvalidConfig(
            format!("PCA9685 channel must be between 0 and 15, found {}", channel)
        ))?;

        pca.enable()
            .map_err(|e| DeviceError::InvalidConfig(format!("Cannot enable PCA9685: {:?}", e)))?;

        let mut fan = Self { pca, channel };
        fan.set_speed(0.0)
            .map_err(|e| DeviceError::InvalidConfig(format!("Cannot stop the fan: {}", e)))?;

        Ok(fan)
    }
}

impl<I2C, E> FanDriver for Pca9685Fan<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: std::fmt::Debug
{
    fn set_speed(&mut self, fraction: f64) -> Result<(), FanError> {
        check_speed(fraction)?;

        // The output goes high at count 0 and low at the off count
        let off = ((fraction * MAX_PWM as f64) as u16).min(MAX_PWM - 1);

        self.pca.set_channel_on(self.channel, 0)
            .and_then(|_| self.pca.set_channel_off(self.channel, off))
            .map_err(|e| match e {
                pwm_pca9685::Error::I2C(e) => FanError::I2c(format!("{:?}", e)),
                pwm_pca9685::Error::InvalidInputData => FanError::InvalidSpeed(fraction)
            })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Open a PCA9685 fan on the Raspberry Pi's I2C bus.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub(crate) fn open_rpi(
    params: &Pca9685Params
) -> Result<Box<dyn super::FanDriver + Send>, DeviceError> {
    use rppal::i2c::I2c;

    let i2c = I2c::with_bus(params.i2c_bus)
        .map_err(|e| DeviceError::NotFound(format!("I2C bus {}: {}", params.i2c_bus, e)))?;

    let pca = Pca9685::new(i2c, params.address)
        .map_err(|e| DeviceError::NotFound(format!("PCA9685 at {:#x}: {:?}", params.address, e)))?;

    Ok(Box::new(Pca9685Fan::new(pca, params.channel)?))
}

/// The PCA9685 is only reachable through the Raspberry Pi's I2C peripheral.
#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
pub(crate) fn open_rpi(
    _params: &Pca9685Params
) -> Result<Box<dyn super::FanDriver + Send>, DeviceError> {
    Err(DeviceError::Unsupported("PCA9685"))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn channel_from_index(index: u8) -> Option<Channel> {
    let channel = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None
    };

    Some(channel)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
