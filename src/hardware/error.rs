//! Sensor error types and handling

/// Errors reported by the positioning device and the light sensor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    /// Measurement requested before the device was initialized
    #[error("{device} must be initialized before measuring")]
    NotInitialized { device: &'static str },
    /// Device configuration does not match what was requested
    #[error("{device} configuration error: {details}")]
    Configuration { device: &'static str, details: String },
    /// Device reported an error code during a measurement
    #[error("{device} fault: {details}")]
    DeviceFault { device: &'static str, details: String },
    /// Device is not reachable on its bus
    #[error("{device} is not connected")]
    NotConnected { device: &'static str },
}

/// Result type for sensor operations
pub type SensorResult<T> = Result<T, SensorError>;

impl SensorError {
    /// Whether retrying the same operation on the next cycle may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SensorError::DeviceFault { .. })
    }
}
