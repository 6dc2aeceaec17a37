//! Core data types for the acquisition pipeline

use crate::core::constants::READING_TIMESTAMP_FORMAT;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 3D position reported by the positioning device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Illuminance in lux as reported by the light sensor
pub type Illuminance = f64;

/// Fixed UWB anchor with known coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub network_id: u16,
    pub position: Position,
}

impl Anchor {
    pub fn new(network_id: u16, position: Position) -> Self {
        Self { network_id, position }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04x} ({}, {}, {})",
            self.network_id, self.position.x, self.position.y, self.position.z
        )
    }
}

/// Light reading tagged with the position it was taken at.
///
/// Serializes to the field names the Flux server expects
/// (`luxValue`, `xposition`, `yposition`, `zposition`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "luxValue")]
    lux_value: Illuminance,
    xposition: f64,
    yposition: f64,
    zposition: f64,
    timestamp: String,
}

impl Reading {
    /// Create a reading stamped with the current local time
    pub fn new(lux_value: Illuminance, position: Position) -> Self {
        Self::at(lux_value, position, Local::now().naive_local())
    }

    /// Create a reading with an explicit timestamp
    pub fn at(lux_value: Illuminance, position: Position, taken_at: NaiveDateTime) -> Self {
        Self {
            lux_value,
            xposition: position.x,
            yposition: position.y,
            zposition: position.z,
            timestamp: taken_at.format(READING_TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn lux_value(&self) -> Illuminance {
        self.lux_value
    }

    pub fn position(&self) -> Position {
        Position::new(self.xposition, self.yposition, self.zposition)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}
