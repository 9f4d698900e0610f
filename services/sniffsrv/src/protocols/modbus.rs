//! Modbus RTU frame recovery and inspection
//!
//! - `crc`: checksum engine
//! - `extractor`: CRC-driven frame synchronization over a raw byte stream
//! - `frame`: validated frames and request/response classification
//! - `pdu`: payload accessors and summaries

pub mod constants;
pub mod crc;
pub mod extractor;
pub mod frame;
pub mod pdu;

pub use extractor::{find_frame, ExtractorStats, FrameExtractor, FrameLimits};
pub use frame::{classify, is_register_read, is_request, ClassifiedFrame, FrameKind, RawFrame};
