//! Validated RTU frames and request/response classification
//!
//! The bridge relays both directions of the bus over one byte stream, so the
//! direction of a frame has to be guessed from its function code and length.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::constants::{
    CRC_LEN, EXCEPTION_FLAG, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_REGISTER,
    FIXED_REQUEST_LEN, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use super::crc;
use crate::error::{Result, SniffSrvError};

/// A CRC-valid RTU frame as recovered from the stream
#[derive(Debug, Clone)]
pub struct RawFrame {
    bytes: Bytes,
    received_at: Instant,
    timestamp: DateTime<Utc>,
}

impl RawFrame {
    /// Validate length and CRC and wrap the bytes
    pub fn parse(bytes: Bytes, received_at: Instant) -> Result<Self> {
        if bytes.len() < MIN_FRAME_SIZE || bytes.len() > MAX_FRAME_SIZE {
            return Err(SniffSrvError::protocol(format!(
                "Frame length {} outside [{}, {}]",
                bytes.len(),
                MIN_FRAME_SIZE,
                MAX_FRAME_SIZE
            )));
        }
        if !crc::verify(&bytes) {
            return Err(SniffSrvError::protocol(format!(
                "CRC mismatch on {} byte frame",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            received_at,
            timestamp: Utc::now(),
        })
    }

    #[inline]
    pub fn device_id(&self) -> u8 {
        self.bytes[0]
    }

    #[inline]
    pub fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a parsed frame; present for API symmetry with `len`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes between the function code and the CRC
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - CRC_LEN]
    }

    /// Monotonic arrival time, used for latency
    #[inline]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Wall clock arrival time, used for records
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Direction/role of a frame on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Request,
    Response,
    ErrorResponse,
}

impl FrameKind {
    pub fn is_request(self) -> bool {
        matches!(self, FrameKind::Request)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrameKind::Request => "REQUEST",
            FrameKind::Response => "RESPONSE",
            FrameKind::ErrorResponse => "ERROR RESPONSE",
        };
        f.write_str(label)
    }
}

/// Classify a frame from its function code and total length
///
/// | function code        | request when      |
/// |----------------------|-------------------|
/// | bit 7 set            | never (exception) |
/// | 0x01..=0x04 (reads)  | len <= 8          |
/// | 0x06                 | len == 8          |
/// | 0x10                 | len > 9           |
/// | anything else        | always            |
///
/// A read response carrying a single coil byte is short enough to look like a
/// request; the table is a heuristic and keeps that ambiguity.
pub fn classify(function_code: u8, frame_len: usize) -> FrameKind {
    let request_if = |is_request: bool| {
        if is_request {
            FrameKind::Request
        } else {
            FrameKind::Response
        }
    };

    match function_code {
        fc if fc & EXCEPTION_FLAG != 0 => FrameKind::ErrorResponse,
        FC_READ_COILS
        | FC_READ_DISCRETE_INPUTS
        | FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS => request_if(frame_len <= FIXED_REQUEST_LEN),
        FC_WRITE_SINGLE_REGISTER => request_if(frame_len == FIXED_REQUEST_LEN),
        FC_WRITE_MULTIPLE_REGISTERS => request_if(frame_len > FIXED_REQUEST_LEN + 1),
        _ => FrameKind::Request,
    }
}

/// True if the frame would be classified as a request
#[inline]
pub fn is_request(function_code: u8, frame: &[u8]) -> bool {
    classify(function_code, frame.len()).is_request()
}

/// True for the register reads whose responses are decoded into readings
#[inline]
pub fn is_register_read(function_code: u8) -> bool {
    matches!(
        function_code,
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS
    )
}

/// A frame together with its classification
#[derive(Debug, Clone)]
pub struct ClassifiedFrame {
    pub frame: RawFrame,
    pub kind: FrameKind,
}

impl ClassifiedFrame {
    pub fn new(frame: RawFrame) -> Self {
        let kind = classify(frame.function_code(), frame.len());
        Self { frame, kind }
    }
}
