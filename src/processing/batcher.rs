//! Reading accumulation between batch sends

use crate::core::Reading;

/// Ordered readings waiting to be sent
#[derive(Debug, Default)]
pub struct ReadingBatcher {
    readings: Vec<Reading>,
}

impl ReadingBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Put readings from a rejected send back in front of newer ones
    pub fn requeue(&mut self, mut readings: Vec<Reading>) {
        readings.append(&mut self.readings);
        self.readings = readings;
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// True when at least `min_batch_size` readings wait and no send is in flight
    pub fn ready_to_flush(&self, min_batch_size: usize, send_pending: bool) -> bool {
        !send_pending && self.readings.len() >= min_batch_size
    }

    /// Take every accumulated reading, leaving the batch empty
    pub fn drain_all(&mut self) -> Vec<Reading> {
        std::mem::take(&mut self.readings)
    }
}
