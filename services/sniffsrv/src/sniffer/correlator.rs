//! Request/response pairing by device id
//!
//! One outstanding request per device. A newer request replaces the older one
//! and pending entries never expire.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocols::modbus::RawFrame;

/// Last request seen for a device
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub frame: RawFrame,
    pub at: Instant,
}

/// Result of matching a response
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    /// `None` when no request was pending
    pub latency: Option<Duration>,
    pub request: Option<RawFrame>,
}

impl Correlation {
    /// Latency in milliseconds, rounded to one decimal
    pub fn latency_ms(&self) -> Option<f64> {
        self.latency.map(round_ms)
    }
}

pub fn round_ms(latency: Duration) -> f64 {
    (latency.as_secs_f64() * 10_000.0).round() / 10.0
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u8, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request; returns the request it replaced, if any
    pub fn on_request(&mut self, frame: RawFrame, now: Instant) -> Option<PendingRequest> {
        self.pending
            .insert(frame.device_id(), PendingRequest { frame, at: now })
    }

    /// Match a response against the pending request of `device_id` and consume it
    pub fn on_response(&mut self, device_id: u8, now: Instant) -> Correlation {
        match self.pending.remove(&device_id) {
            Some(pending) => Correlation {
                latency: Some(now.saturating_duration_since(pending.at)),
                request: Some(pending.frame),
            },
            None => Correlation::default(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
