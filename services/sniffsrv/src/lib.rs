//! Passive Modbus RTU sniffer (`sniffsrv`)
//!
//! Listens for a serial-to-TCP bridge that relays both directions of an RS485
//! bus as one unframed byte stream, recovers RTU frames by CRC, pairs requests
//! with responses and decodes register reads into named readings.
//!
//! ```text
//! TcpStream -> FrameExtractor -> RawFrame -> SnifferEngine -> Publisher
//!              (per connection)              (shared, mutex)
//! ```

pub mod config;
pub mod error;
pub mod protocols;
pub mod publisher;
pub mod server;
pub mod sniffer;

pub use config::SnifferConfig;
pub use error::{Result, SniffSrvError};
pub use publisher::{ChannelPublisher, LogPublisher, PublishEvent, Publisher};
pub use server::{ConnectionWorker, SnifferServer};
pub use sniffer::{SnifferEngine, StatsSnapshot};
