//! Output side of the sniffer
//!
//! The engine produces `FrameOutcome`s; a `Publisher` decides where they go.
//! `LogPublisher` writes them to the log, `ChannelPublisher` forwards them to
//! an in-process consumer.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DevicesConfig;
use crate::sniffer::{DecodedReadings, FrameOutcome, FrameRecord, FrameReport, StatsSnapshot};

/// Sink for everything the engine produces
///
/// Called from connection tasks after the engine lock is released, so
/// implementations must not block for long.
pub trait Publisher: Send + Sync {
    fn publish_frame(&self, record: &FrameRecord);

    fn publish_readings(&self, readings: &DecodedReadings);

    fn publish_stats(&self, snapshot: &StatsSnapshot);
}

/// Hand one outcome to a publisher
pub fn dispatch(publisher: &dyn Publisher, outcome: &FrameOutcome) {
    match &outcome.report {
        Some(FrameReport::Decoded(readings)) => publisher.publish_readings(readings),
        Some(FrameReport::Described(record)) => publisher.publish_frame(record),
        None => {},
    }
    if let Some(snapshot) = &outcome.snapshot {
        publisher.publish_stats(snapshot);
    }
}

/// Writes readings and statistics through `tracing`
#[derive(Debug, Clone, Default)]
pub struct LogPublisher {
    devices: DevicesConfig,
}

impl LogPublisher {
    pub fn new(devices: DevicesConfig) -> Self {
        Self { devices }
    }
}

impl Publisher for LogPublisher {
    fn publish_frame(&self, record: &FrameRecord) {
        debug!(
            "{} [{}] {} bytes: {}",
            record.kind,
            self.devices.display_name(record.device_id),
            record.len,
            record.raw_hex
        );
    }

    fn publish_readings(&self, readings: &DecodedReadings) {
        let device = self.devices.display_name(readings.device_id);
        for reading in &readings.readings {
            info!(
                "  {} | {} = {}{}{}",
                device,
                self.devices.object_id(readings.device_id, &reading.name),
                reading.value,
                if reading.unit.is_empty() { "" } else { " " },
                reading.unit
            );
        }
        if let Some(ms) = readings.latency_ms {
            info!(
                "  {} | {} = {:.1} ms",
                device,
                self.devices.object_id(readings.device_id, "Response Time"),
                ms
            );
        }
    }

    fn publish_stats(&self, snapshot: &StatsSnapshot) {
        let global = &snapshot.global.counters;
        info!(
            "Stats: {} frames, {} valid, {} errors, quality {:.1}%",
            global.total_frames,
            global.valid_frames,
            global.errors,
            snapshot.global.quality * 100.0
        );
        for device in &snapshot.devices {
            info!(
                "  {}: {} valid, {} errors, {} readings published, quality {:.1}%",
                self.devices.display_name(device.device_id),
                device.counters.valid_frames,
                device.counters.errors,
                device.counters.published_count,
                device.quality * 100.0
            );
        }
        match serde_json::to_string(snapshot) {
            Ok(json) => debug!("Stats payload: {}", json),
            Err(e) => warn!("Failed to serialize stats snapshot: {}", e),
        }
    }
}

/// Event forwarded by `ChannelPublisher`
#[derive(Debug, Clone)]
pub enum PublishEvent {
    Frame(FrameRecord),
    Readings(DecodedReadings),
    Stats(StatsSnapshot),
}

/// Forwards every event into an unbounded channel
///
/// Sends to a closed channel are dropped.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<PublishEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PublishEvent) {
        if self.tx.send(event).is_err() {
            debug!("Publish channel closed, event dropped");
        }
    }
}

impl Publisher for ChannelPublisher {
    fn publish_frame(&self, record: &FrameRecord) {
        self.send(PublishEvent::Frame(record.clone()));
    }

    fn publish_readings(&self, readings: &DecodedReadings) {
        self.send(PublishEvent::Readings(readings.clone()));
    }

    fn publish_stats(&self, snapshot: &StatsSnapshot) {
        self.send(PublishEvent::Stats(snapshot.clone()));
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocols::modbus::{crc, RawFrame};
    use crate::sniffer::{RegisterMap, SnifferEngine};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Instant;
    use tracing_test::traced_test;

    fn frame(body: &[u8]) -> RawFrame {
        let mut v = body.to_vec();
        crc::append(&mut v);
        RawFrame::parse(Bytes::from(v), Instant::now()).unwrap()
    }

    fn decode_pair(engine: &mut SnifferEngine) -> (FrameOutcome, FrameOutcome) {
        // Outside and evaporator coil temperature
        let request = engine.process_frame(frame(&[0x01, 0x04, 0x08, 0x3E, 0x00, 0x02]));
        let response = engine.process_frame(frame(&[0x01, 0x04, 0x04, 0x14, 0x82, 0x14, 0x82]));
        (request, response)
    }

    #[test]
    fn test_channel_publisher_forwards_in_order() {
        let mut engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 2);
        let (publisher, mut rx) = ChannelPublisher::new();

        let (request, response) = decode_pair(&mut engine);
        dispatch(&publisher, &request);
        dispatch(&publisher, &response);

        assert!(matches!(rx.try_recv().unwrap(), PublishEvent::Frame(_)));
        match rx.try_recv().unwrap() {
            PublishEvent::Readings(r) => {
                assert_eq!(r.readings.len(), 2);
                assert_eq!(r.readings[0].name, "Outside Temperature");
            },
            other => panic!("unexpected event: {:?}", other),
        }
        // Publish interval of 2 valid frames
        assert!(matches!(rx.try_recv().unwrap(), PublishEvent::Stats(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_frame_publishes_nothing() {
        let (publisher, mut rx) = ChannelPublisher::new();
        dispatch(&publisher, &FrameOutcome::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (publisher, rx) = ChannelPublisher::new();
        drop(rx);
        let mut engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 50);
        let (request, _) = decode_pair(&mut engine);
        dispatch(&publisher, &request);
    }

    #[test]
    #[traced_test]
    fn test_log_publisher_uses_object_ids() {
        let mut engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 2);
        let publisher = LogPublisher::new(DevicesConfig::default());
        let (request, response) = decode_pair(&mut engine);
        dispatch(&publisher, &request);
        dispatch(&publisher, &response);

        assert!(logs_contain("quatt_01_outside_temperature = 22.50 °C"));
        assert!(logs_contain("quatt_01_response_time"));
        assert!(logs_contain("Quatt Heat Pump 01"));
        assert!(logs_contain("Stats: 2 frames, 2 valid, 0 errors"));
    }

    #[test]
    fn test_published_count_excludes_response_time() {
        let mut engine = SnifferEngine::new(Arc::new(RegisterMap::heat_pump()), 2);
        let (publisher, mut rx) = ChannelPublisher::new();
        let (request, response) = decode_pair(&mut engine);
        dispatch(&publisher, &request);
        dispatch(&publisher, &response);

        let _ = rx.try_recv().unwrap();
        let published = match rx.try_recv().unwrap() {
            PublishEvent::Readings(r) => {
                assert!(r.latency_ms.is_some());
                r.readings.len() as u64
            },
            other => panic!("unexpected event: {:?}", other),
        };
        match rx.try_recv().unwrap() {
            PublishEvent::Stats(snapshot) => {
                assert_eq!(snapshot.global.counters.published_count, published);
                assert_eq!(snapshot.devices[0].counters.published_count, 2);
            },
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
