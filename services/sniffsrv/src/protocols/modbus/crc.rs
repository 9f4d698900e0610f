//! Modbus CRC16 (poly 0xA001, init 0xFFFF, reflected, little-endian on the wire)

use super::constants::{CRC_LEN, MODBUS_CRC_INIT, MODBUS_CRC_POLY};

/// Running CRC16 state
///
/// Feeding bytes one at a time lets the extractor grow a candidate frame without
/// recomputing the checksum of its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    #[inline]
    pub fn new() -> Self {
        Self {
            value: MODBUS_CRC_INIT,
        }
    }

    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.value ^= u16::from(byte);
        for _ in 0..8 {
            if self.value & 0x0001 != 0 {
                self.value = (self.value >> 1) ^ MODBUS_CRC_POLY;
            } else {
                self.value >>= 1;
            }
        }
    }

    #[inline]
    pub fn update_slice(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Checksum in wire order (low byte first)
    #[inline]
    pub fn to_bytes(&self) -> [u8; 2] {
        self.value.to_le_bytes()
    }

    /// True if `trailer` holds this checksum in wire order
    #[inline]
    pub fn matches(&self, trailer: [u8; 2]) -> bool {
        self.to_bytes() == trailer
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the Modbus CRC16 of `data`, returned in wire order
pub fn compute(data: &[u8]) -> [u8; 2] {
    let mut crc = Crc16::new();
    crc.update_slice(data);
    crc.to_bytes()
}

/// True iff the last two bytes of `frame` are the CRC of the bytes before them
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < CRC_LEN {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - CRC_LEN);
    compute(body) == [trailer[0], trailer[1]]
}

/// Append the CRC to a frame body
pub fn append(body: &mut Vec<u8>) {
    let crc = compute(body);
    body.extend_from_slice(&crc);
}
