//! Simulated sensors for testing and development

use crate::core::{Anchor, Illuminance, Position};
use crate::hardware::{LightSensor, LightSensorConfig, PositioningDevice, SensorError, SensorResult};
use rand::Rng;

const POSITIONER_NAME: &str = "pozyx";
const LIGHT_SENSOR_NAME: &str = "light sensor";

/// Anchors needed for 3D positioning
pub const MIN_POSITIONING_ANCHORS: usize = 4;

/// Simulated UWB positioning tag
pub struct SimulatedPositioner {
    anchors: Vec<Anchor>,
    initialized: bool,
    connected: bool,
    position: Position,
    jitter: f64,
    error_probability: f32,
    pending_faults: u32,
    clear_count: u32,
    measurement_count: u32,
}

impl SimulatedPositioner {
    /// Create a positioner that always reports `position`
    pub fn new(position: Position) -> Self {
        Self {
            anchors: Vec::new(),
            initialized: false,
            connected: true,
            position,
            jitter: 0.0,
            error_probability: 0.0,
            pending_faults: 0,
            clear_count: 0,
            measurement_count: 0,
        }
    }

    /// Add uniform noise of +/- `jitter` on every axis
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    /// Enable random measurement faults with given probability (0.0 to 1.0)
    pub fn simulate_errors(&mut self, probability: f32) {
        self.error_probability = probability.clamp(0.0, 1.0);
    }

    /// Make the next `count` measurements fail with a device fault
    pub fn fail_next(&mut self, count: u32) {
        self.pending_faults = count;
    }

    /// Simulate a lost USB connection
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Anchors currently written to the device
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count
    }

    pub fn measurement_count(&self) -> u32 {
        self.measurement_count
    }

    fn should_fault(&mut self) -> bool {
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return true;
        }
        self.error_probability > 0.0 && rand::thread_rng().gen::<f32>() < self.error_probability
    }

    fn noise(&self) -> f64 {
        if self.jitter == 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(-self.jitter..=self.jitter)
    }
}

impl PositioningDevice for SimulatedPositioner {
    fn initialize(&mut self, anchors: &[Anchor]) -> SensorResult<()> {
        if !self.connected {
            return Err(SensorError::NotConnected { device: POSITIONER_NAME });
        }
        self.initialized = false;
        if anchors.len() < MIN_POSITIONING_ANCHORS {
            return Err(SensorError::Configuration {
                device: POSITIONER_NAME,
                details: format!(
                    "at least {} anchors required for 3D positioning, got {}",
                    MIN_POSITIONING_ANCHORS,
                    anchors.len()
                ),
            });
        }
        self.anchors = anchors.to_vec();
        self.initialized = true;
        Ok(())
    }

    fn clear(&mut self) {
        self.anchors.clear();
        self.initialized = false;
        self.clear_count += 1;
    }

    fn measure(&mut self) -> SensorResult<Position> {
        if !self.connected {
            return Err(SensorError::NotConnected { device: POSITIONER_NAME });
        }
        if !self.initialized {
            return Err(SensorError::NotInitialized { device: POSITIONER_NAME });
        }
        if self.should_fault() {
            return Err(SensorError::DeviceFault {
                device: POSITIONER_NAME,
                details: "positioning round failed".to_string(),
            });
        }
        self.measurement_count += 1;
        Ok(Position::new(
            self.position.x + self.noise(),
            self.position.y + self.noise(),
            self.position.z + self.noise(),
        ))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Simulated ambient light sensor
pub struct SimulatedLightSensor {
    config: Option<LightSensorConfig>,
    lux: Illuminance,
    jitter: f64,
    pending_faults: u32,
    initialize_count: u32,
}

impl SimulatedLightSensor {
    /// Create a sensor that always reports `lux`
    pub fn new(lux: Illuminance) -> Self {
        Self {
            config: None,
            lux,
            jitter: 0.0,
            pending_faults: 0,
            initialize_count: 0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    /// Make the next `count` measurements fail with a device fault
    pub fn fail_next(&mut self, count: u32) {
        self.pending_faults = count;
    }

    pub fn config(&self) -> Option<&LightSensorConfig> {
        self.config.as_ref()
    }

    pub fn initialize_count(&self) -> u32 {
        self.initialize_count
    }
}

impl LightSensor for SimulatedLightSensor {
    fn initialize(&mut self, config: &LightSensorConfig) -> SensorResult<()> {
        config.validate()?;
        self.config = Some(config.clone());
        self.initialize_count += 1;
        Ok(())
    }

    fn measure(&mut self) -> SensorResult<Illuminance> {
        if self.config.is_none() {
            return Err(SensorError::NotInitialized { device: LIGHT_SENSOR_NAME });
        }
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return Err(SensorError::DeviceFault {
                device: LIGHT_SENSOR_NAME,
                details: "i2c read failed".to_string(),
            });
        }
        let noise = if self.jitter == 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        };
        Ok((self.lux + noise).max(0.0))
    }

    fn is_initialized(&self) -> bool {
        self.config.is_some()
    }
}
