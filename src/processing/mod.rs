//! Polling, batching and payload parsing

pub mod poll;
pub mod batcher;
pub mod parser;

pub use poll::{PollError, PollLoop};
pub use batcher::ReadingBatcher;
pub use parser::{parse_active_measurement, ActiveMeasurement, ParseError};
