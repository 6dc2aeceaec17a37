//! Light sensor interface and configuration

use crate::core::Illuminance;
use crate::hardware::{SensorError, SensorResult};
use serde::{Deserialize, Serialize};

/// Hardware abstraction for an ambient light sensor
pub trait LightSensor: Send {
    /// Configure the sensor and start conversions
    fn initialize(&mut self, config: &LightSensorConfig) -> SensorResult<()>;

    /// Read the current illuminance
    fn measure(&mut self) -> SensorResult<Illuminance>;

    /// Check if the sensor has been configured
    fn is_initialized(&self) -> bool;
}

/// Light sensor configuration, passed through to the driver unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSensorConfig {
    /// 7-bit I2C address
    pub i2c_address: u8,
    /// ADC integration time in 2.78ms steps
    pub atime: u8,
    /// Wait time between conversions in 2.78ms steps
    pub wtime: u8,
    /// Multiply the wait time by 12
    pub wlong: bool,
}

impl Default for LightSensorConfig {
    fn default() -> Self {
        Self {
            i2c_address: 0x39,
            atime: 53,
            wtime: 0,
            wlong: false,
        }
    }
}

impl LightSensorConfig {
    pub fn validate(&self) -> SensorResult<()> {
        if self.i2c_address > 0x7F {
            return Err(SensorError::Configuration {
                device: "light sensor",
                details: format!("i2c address 0x{:02X} (must be <= 0x7F)", self.i2c_address),
            });
        }
        Ok(())
    }
}
