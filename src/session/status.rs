//! Shared outcome slot for asynchronous batch sends

use crate::core::STATUS_OK;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const PENDING: u32 = 0;
const TRANSPORT_FAILED: u32 = u32::MAX;

/// Decoded value of a [`ResponseSlot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// A send is in flight
    Pending,
    /// Last send completed with this HTTP status
    Completed(u16),
    /// Last send never produced a response
    TransportFailed,
}

impl SendStatus {
    fn encode(self) -> u32 {
        match self {
            SendStatus::Pending => PENDING,
            SendStatus::Completed(status) => u32::from(status),
            SendStatus::TransportFailed => TRANSPORT_FAILED,
        }
    }

    fn decode(raw: u32) -> Self {
        match raw {
            PENDING => SendStatus::Pending,
            TRANSPORT_FAILED => SendStatus::TransportFailed,
            status => u16::try_from(status).map_or(SendStatus::TransportFailed, SendStatus::Completed),
        }
    }
}

/// Status of the most recent batch send.
///
/// Written by completion callbacks on the sender thread and read by the
/// measurement loop. Clones share the same slot.
#[derive(Debug, Clone)]
pub struct ResponseSlot {
    value: Arc<AtomicU32>,
}

impl Default for ResponseSlot {
    fn default() -> Self {
        Self {
            value: Arc::new(AtomicU32::new(u32::from(STATUS_OK))),
        }
    }
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> SendStatus {
        SendStatus::decode(self.value.load(Ordering::Acquire))
    }

    pub fn store(&self, status: SendStatus) {
        self.value.store(status.encode(), Ordering::Release);
    }

    /// Mark the slot ready for the next send
    pub fn reset_ok(&self) {
        self.store(SendStatus::Completed(STATUS_OK));
    }

    /// Atomically move the slot from 200 to pending.
    /// Returns false if the slot held anything else.
    pub fn try_claim(&self) -> bool {
        self.value
            .compare_exchange(u32::from(STATUS_OK), PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.load() == SendStatus::Pending
    }
}
