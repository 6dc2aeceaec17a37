//! Flux Sensors
//!
//! Sensor node that waits for an active measurement on a Flux server,
//! configures its UWB positioning tag and light sensor for it, and streams
//! position-tagged light readings back in batches.

pub mod core;
pub mod hardware;
pub mod transport;
pub mod processing;
pub mod session;
pub mod orchestrator;
pub mod utils;

// Re-export commonly used types
pub use core::{Anchor, Illuminance, Position, Reading};
pub use hardware::{LightSensor, LightSensorConfig, PositioningDevice, SensorError, SimulatedLightSensor, SimulatedPositioner};
pub use transport::{HttpResponse, HttpTransport, MockTransport, Transport, TransportError};
pub use processing::{PollError, PollLoop, ReadingBatcher, ParseError};
pub use session::{ResponseSlot, SendStatus, ServerSession, SessionError};
pub use orchestrator::{AcquisitionOrchestrator, AcquisitionState, InitializationError, OrchestratorSettings, SessionOutcome};
pub use utils::{Config, ConfigError, Credentials};
