//! Positioning device interface

use crate::core::{Anchor, Position};
use crate::hardware::SensorResult;

/// Hardware abstraction for a UWB positioning tag
pub trait PositioningDevice: Send {
    /// Write the anchor set to the device and verify its configuration.
    /// The device is unusable until this succeeds.
    fn initialize(&mut self, anchors: &[Anchor]) -> SensorResult<()>;

    /// Drop all anchors and return to the uninitialized state
    fn clear(&mut self);

    /// Perform one positioning round
    fn measure(&mut self) -> SensorResult<Position>;

    /// Check if the device has a committed anchor configuration
    fn is_initialized(&self) -> bool;
}
