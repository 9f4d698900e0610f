//! Frame statistics, global and per device

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocols::modbus::constants::STATS_PUBLISH_INTERVAL;

/// Counter set kept both globally and for each device id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounters {
    pub total_frames: u64,
    pub valid_frames: u64,
    pub requests: u64,
    pub responses: u64,
    pub errors: u64,
    /// Decoded readings handed to the publisher
    ///
    /// Counted when a read response is decoded; every decoded report is
    /// dispatched. The response time published next to them is not a reading.
    pub published_count: u64,
}

impl FrameCounters {
    /// Share of all frames that were processed successfully
    #[allow(clippy::cast_precision_loss)]
    pub fn quality(&self) -> f64 {
        self.valid_frames as f64 / self.total_frames.max(1) as f64
    }

    /// Share of attributed frames that were processed successfully
    #[allow(clippy::cast_precision_loss)]
    pub fn device_quality(&self) -> f64 {
        self.valid_frames as f64 / (self.valid_frames + self.errors).max(1) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    #[serde(flatten)]
    pub counters: FrameCounters,
    pub quality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStats {
    pub device_id: u8,
    #[serde(flatten)]
    pub counters: FrameCounters,
    pub quality: f64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub global: GlobalStats,
    /// Devices seen so far, ordered by id
    pub devices: Vec<DeviceStats>,
}

#[derive(Debug)]
pub struct StatsAggregator {
    global: FrameCounters,
    devices: BTreeMap<u8, FrameCounters>,
    publish_interval: u64,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(STATS_PUBLISH_INTERVAL)
    }
}

impl StatsAggregator {
    /// `publish_interval` is clamped to at least 1
    pub fn new(publish_interval: u64) -> Self {
        Self {
            global: FrameCounters::default(),
            devices: BTreeMap::new(),
            publish_interval: publish_interval.max(1),
        }
    }

    fn device(&mut self, device_id: u8) -> &mut FrameCounters {
        self.devices.entry(device_id).or_default()
    }

    /// Count a frame handed to the engine
    pub fn record_frame(&mut self, device_id: u8) {
        self.global.total_frames += 1;
        self.device(device_id).total_frames += 1;
    }

    pub fn record_request(&mut self, device_id: u8) {
        self.global.requests += 1;
        self.device(device_id).requests += 1;
    }

    pub fn record_response(&mut self, device_id: u8) {
        self.global.responses += 1;
        self.device(device_id).responses += 1;
    }

    /// Count a successfully processed frame; returns a snapshot every `publish_interval` of them
    pub fn record_valid(&mut self, device_id: u8) -> Option<StatsSnapshot> {
        self.global.valid_frames += 1;
        self.device(device_id).valid_frames += 1;

        if self.global.valid_frames % self.publish_interval == 0 {
            Some(self.snapshot())
        } else {
            None
        }
    }

    pub fn record_error(&mut self, device_id: u8) {
        self.global.errors += 1;
        self.device(device_id).errors += 1;
    }

    pub fn record_published(&mut self, device_id: u8, count: u64) {
        self.global.published_count += count;
        self.device(device_id).published_count += count;
    }

    pub fn global(&self) -> &FrameCounters {
        &self.global
    }

    pub fn device_counters(&self, device_id: u8) -> Option<&FrameCounters> {
        self.devices.get(&device_id)
    }

    pub fn publish_interval(&self) -> u64 {
        self.publish_interval
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            taken_at: Utc::now(),
            global: GlobalStats {
                counters: self.global,
                quality: self.global.quality(),
            },
            devices: self
                .devices
                .iter()
                .map(|(&device_id, counters)| DeviceStats {
                    device_id,
                    counters: *counters,
                    quality: counters.device_quality(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_quality_is_exact_ratio() {
        let mut stats = StatsAggregator::new(1000);
        for i in 0..7u8 {
            stats.record_frame(i % 2);
            if i == 3 {
                stats.record_error(i % 2);
            } else {
                stats.record_valid(i % 2);
            }
        }
        assert_eq!(stats.global().total_frames, 7);
        assert_eq!(stats.global().valid_frames, 6);
        assert_eq!(stats.global().quality(), 6.0 / 7.0);
    }

    #[test]
    fn test_quality_without_frames() {
        let counters = FrameCounters::default();
        assert_eq!(counters.quality(), 0.0);
        assert_eq!(counters.device_quality(), 0.0);
    }

    #[test]
    fn test_device_quality() {
        let mut stats = StatsAggregator::default();
        for _ in 0..3 {
            stats.record_frame(5);
            stats.record_valid(5);
        }
        stats.record_frame(5);
        stats.record_error(5);
        assert_eq!(stats.device_counters(5).unwrap().device_quality(), 0.75);
    }

    #[test]
    fn test_snapshot_every_interval() {
        let mut stats = StatsAggregator::default();
        let mut snapshots = 0;
        for i in 0..120u32 {
            stats.record_frame(1);
            if stats.record_valid(1).is_some() {
                snapshots += 1;
                assert!(i == 49 || i == 99);
            }
        }
        assert_eq!(snapshots, 2);
    }

    #[test]
    fn test_errors_do_not_trigger_snapshot() {
        let mut stats = StatsAggregator::new(2);
        stats.record_frame(1);
        assert!(stats.record_valid(1).is_none());
        stats.record_frame(1);
        stats.record_error(1);
        stats.record_frame(1);
        assert!(stats.record_valid(1).is_some());
    }

    #[test]
    fn test_snapshot_lists_devices_in_order() {
        let mut stats = StatsAggregator::new(10);
        for id in [7u8, 2, 9] {
            stats.record_frame(id);
            stats.record_request(id);
            stats.record_valid(id);
        }
        stats.record_published(2, 4);

        let snapshot = stats.snapshot();
        let ids: Vec<u8> = snapshot.devices.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec![2, 7, 9]);
        assert_eq!(snapshot.devices[0].counters.published_count, 4);
        assert_eq!(snapshot.global.counters.requests, 3);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["global"]["total_frames"], 3);
        assert_eq!(json["devices"][0]["device_id"], 2);
    }

    #[test]
    fn test_zero_interval_clamped() {
        assert_eq!(StatsAggregator::new(0).publish_interval(), 1);
    }
}
