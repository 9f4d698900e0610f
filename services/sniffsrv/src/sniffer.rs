//! Reconstruction pipeline behind the frame extractor
//!
//! `engine` ties together the correlator, the register decoder and the
//! statistics; everything in here is synchronous.

pub mod correlator;
pub mod decoder;
pub mod engine;
pub mod registers;
pub mod stats;

pub use correlator::{Correlation, Correlator, PendingRequest};
pub use decoder::{decode, ReadingValue, RegisterSource, SensorReading};
pub use engine::{
    DecodedReadings, FrameOutcome, FrameRecord, FrameReport, SharedEngine, SnifferEngine,
};
pub use registers::{
    RegisterMap, RegisterMapping, SensorClass, SingleBitFlag, StatusBit, StatusBitTable,
};
pub use stats::{DeviceStats, FrameCounters, GlobalStats, StatsAggregator, StatsSnapshot};
