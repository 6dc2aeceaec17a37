//! Core types and constants for the flux sensor node

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
