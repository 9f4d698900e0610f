//! Per-frame processing shared by all connections
//!
//! Classifies, correlates, decodes and counts one frame at a time. The engine is
//! shared behind a mutex; workers hold the lock only for `process_frame` and
//! publish the returned outcome after releasing it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::correlator::{round_ms, Correlator};
use super::decoder::{decode, SensorReading};
use super::registers::RegisterMap;
use super::stats::{StatsAggregator, StatsSnapshot};
use crate::error::Result;
use crate::protocols::modbus::{is_register_read, pdu, ClassifiedFrame, FrameKind, RawFrame};

pub type SharedEngine = Arc<Mutex<SnifferEngine>>;

/// Readings decoded from one read response
#[derive(Debug, Clone, Serialize)]
pub struct DecodedReadings {
    pub device_id: u8,
    pub function_code: u8,
    pub start_address: u16,
    /// Round-trip time from the matched request, in milliseconds
    pub latency_ms: Option<f64>,
    pub readings: Vec<SensorReading>,
    pub timestamp: DateTime<Utc>,
}

/// Descriptive record of a frame that was not decoded into readings
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub device_id: u8,
    pub function_code: u8,
    pub kind: FrameKind,
    pub summary: String,
    pub latency_ms: Option<f64>,
    pub raw_hex: String,
    pub len: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameReport {
    Decoded(DecodedReadings),
    Described(FrameRecord),
}

/// What a single frame produced for the publisher
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    /// `None` when the frame failed processing
    pub report: Option<FrameReport>,
    pub snapshot: Option<StatsSnapshot>,
}

pub struct SnifferEngine {
    registers: Arc<RegisterMap>,
    correlator: Correlator,
    stats: StatsAggregator,
}

impl SnifferEngine {
    pub fn new(registers: Arc<RegisterMap>, publish_interval: u64) -> Self {
        Self {
            registers,
            correlator: Correlator::new(),
            stats: StatsAggregator::new(publish_interval),
        }
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Process one CRC-valid frame
    ///
    /// Never fails: a frame that cannot be handled is counted as an error and
    /// dropped so the stream keeps going.
    pub fn process_frame(&mut self, frame: RawFrame) -> FrameOutcome {
        let device_id = frame.device_id();
        self.stats.record_frame(device_id);

        match self.handle_frame(frame) {
            Ok(report) => FrameOutcome {
                report: Some(report),
                snapshot: self.stats.record_valid(device_id),
            },
            Err(e) => {
                warn!("Frame from device {:02X} dropped: {}", device_id, e);
                self.stats.record_error(device_id);
                FrameOutcome::default()
            },
        }
    }

    fn handle_frame(&mut self, frame: RawFrame) -> Result<FrameReport> {
        let ClassifiedFrame { frame, kind } = ClassifiedFrame::new(frame);
        let device_id = frame.device_id();
        let function_code = frame.function_code();

        if kind.is_request() {
            self.stats.record_request(device_id);
            let summary = pdu::describe_request(&frame);
            info!(
                "REQUEST  [{:02X}] FC={:02X} | {}",
                device_id, function_code, summary
            );
            let record = describe(&frame, kind, summary, None);
            let at = frame.received_at();
            if let Some(replaced) = self.correlator.on_request(frame, at) {
                debug!(
                    "Device {:02X}: unanswered FC={:02X} request replaced",
                    device_id,
                    replaced.frame.function_code()
                );
            }
            return Ok(FrameReport::Described(record));
        }

        self.stats.record_response(device_id);
        let correlation = self.correlator.on_response(device_id, frame.received_at());
        let latency_ms = correlation.latency_ms();

        if let (FrameKind::Response, true, Some(request)) = (
            kind,
            is_register_read(function_code),
            correlation.request.as_ref(),
        ) {
            let start_address = pdu::start_address(request)?;
            let values = pdu::read_response_values(&frame)?;
            let readings = decode(&self.registers, start_address, &values);

            info!(
                "RESPONSE [{:02X}] FC={:02X} | {} | {} readings{}",
                device_id,
                function_code,
                pdu::describe_response(&frame),
                readings.len(),
                format_latency(correlation.latency)
            );
            self.stats
                .record_published(device_id, readings.len() as u64);

            return Ok(FrameReport::Decoded(DecodedReadings {
                device_id,
                function_code,
                start_address,
                latency_ms,
                readings,
                timestamp: frame.timestamp(),
            }));
        }

        let summary = pdu::describe_response(&frame);
        info!(
            "{} [{:02X}] FC={:02X} | {}{}",
            kind,
            device_id,
            function_code,
            summary,
            format_latency(correlation.latency)
        );
        Ok(FrameReport::Described(describe(
            &frame, kind, summary, latency_ms,
        )))
    }

    pub fn registers(&self) -> &Arc<RegisterMap> {
        &self.registers
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

fn describe(frame: &RawFrame, kind: FrameKind, summary: String, latency_ms: Option<f64>) -> FrameRecord {
    FrameRecord {
        device_id: frame.device_id(),
        function_code: frame.function_code(),
        kind,
        summary,
        latency_ms,
        raw_hex: common::hex::encode_spaced(frame.as_bytes()),
        len: frame.len(),
        timestamp: frame.timestamp(),
    }
}

fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(l) => format!(" | {:.1}ms", round_ms(l)),
        None => String::new(),
    }
}
