//! Hardware abstraction layer for the node's sensors
//!
//! The acquisition pipeline only talks to the positioning device and the
//! light sensor through these traits. Simulated implementations are provided
//! for development and tests.

pub mod positioning;
pub mod light;
pub mod mock;
pub mod error;

pub use positioning::PositioningDevice;
pub use light::{LightSensor, LightSensorConfig};
pub use mock::{SimulatedLightSensor, SimulatedPositioner};
pub use error::{SensorError, SensorResult};
