//! Frame recovery from an unframed RTU byte stream
//!
//! The serial-to-TCP bridge drops inter-character timing, so frame boundaries
//! are found by CRC alone: the leftmost start offset that has any CRC-valid
//! candidate wins, and at that offset the shortest valid length wins. Bytes in
//! front of the match are noise. When nothing matches and the buffer has grown
//! past `max_buffer_size`, a fixed chunk is dropped from the front so the stream
//! can resynchronize.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::constants::{
    BUFFER_CLEANUP_SIZE, CRC_LEN, MAX_BUFFER_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use super::crc::Crc16;
use crate::error::{Result, SniffSrvError};

/// Frame and buffer size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLimits {
    pub min_frame_size: usize,
    pub max_frame_size: usize,
    pub max_buffer_size: usize,
    pub buffer_cleanup_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            min_frame_size: MIN_FRAME_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            max_buffer_size: MAX_BUFFER_SIZE,
            buffer_cleanup_size: BUFFER_CLEANUP_SIZE,
        }
    }
}

impl FrameLimits {
    pub fn validate(&self) -> Result<()> {
        if self.min_frame_size < MIN_FRAME_SIZE {
            return Err(SniffSrvError::config(format!(
                "framing.min_frame_size must be >= {}, got {}",
                MIN_FRAME_SIZE, self.min_frame_size
            )));
        }
        if self.max_frame_size > MAX_FRAME_SIZE {
            return Err(SniffSrvError::config(format!(
                "framing.max_frame_size must be <= {}, got {}",
                MAX_FRAME_SIZE, self.max_frame_size
            )));
        }
        if self.min_frame_size > self.max_frame_size {
            return Err(SniffSrvError::config(format!(
                "framing.min_frame_size ({}) exceeds max_frame_size ({})",
                self.min_frame_size, self.max_frame_size
            )));
        }
        if self.max_buffer_size < self.max_frame_size {
            return Err(SniffSrvError::config(format!(
                "framing.max_buffer_size ({}) must hold a full frame ({})",
                self.max_buffer_size, self.max_frame_size
            )));
        }
        if self.buffer_cleanup_size == 0 || self.buffer_cleanup_size > self.max_buffer_size {
            return Err(SniffSrvError::config(format!(
                "framing.buffer_cleanup_size must be in 1..={}, got {}",
                self.max_buffer_size, self.buffer_cleanup_size
            )));
        }
        Ok(())
    }
}

/// Locate the leftmost-shortest CRC-valid frame in `buf`
///
/// Returns `(start, len)`. The checksum of each candidate body is extended one
/// byte at a time instead of being recomputed per length.
pub fn find_frame(buf: &[u8], limits: &FrameLimits) -> Option<(usize, usize)> {
    let min = limits.min_frame_size.max(CRC_LEN + 1);
    if buf.len() < min {
        return None;
    }

    for start in 0..=buf.len() - min {
        let window = &buf[start..];
        let max_len = window.len().min(limits.max_frame_size);
        if max_len < min {
            break;
        }

        let mut crc = Crc16::new();
        crc.update_slice(&window[..min - CRC_LEN]);
        for len in min..=max_len {
            if crc.matches([window[len - 2], window[len - 1]]) {
                return Some((start, len));
            }
            crc.update(window[len - CRC_LEN]);
        }
    }
    None
}

/// Resynchronization counters of one extractor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractorStats {
    /// Frames handed out
    pub frames: u64,
    /// Bytes skipped in front of a matched frame
    pub noise_bytes: u64,
    /// Bytes dropped by buffer cleanup
    pub dropped_bytes: u64,
    /// Number of cleanup steps
    pub cleanups: u64,
}

/// Per-connection frame extractor owning the accumulation buffer
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: BytesMut,
    limits: FrameLimits,
    stats: ExtractorStats,
}

impl FrameExtractor {
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            buffer: BytesMut::with_capacity(limits.max_buffer_size * 2),
            limits,
            stats: ExtractorStats::default(),
        }
    }

    /// Append newly received bytes
    pub fn feed(&mut self, data: &[u8]) {
        trace!("Extractor fed {} bytes (buffered {})", data.len(), self.buffer.len());
        self.buffer.extend_from_slice(data);
    }

    /// Pull the next frame out of the buffer, if one can be recovered now
    ///
    /// Returns `None` when more bytes are needed; the unconsumed remainder stays
    /// buffered for the next call.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        while self.buffer.len() >= self.limits.min_frame_size {
            if let Some((start, len)) = find_frame(&self.buffer, &self.limits) {
                if start > 0 {
                    debug!("Discarding {} noise bytes before frame", start);
                    self.buffer.advance(start);
                    self.stats.noise_bytes += start as u64;
                }
                self.stats.frames += 1;
                return Some(self.buffer.split_to(len).freeze());
            }

            if self.buffer.len() > self.limits.max_buffer_size {
                let drop = self.limits.buffer_cleanup_size.min(self.buffer.len());
                warn!(
                    "No valid frame in {} buffered bytes, dropping {} to resynchronize",
                    self.buffer.len(),
                    drop
                );
                self.buffer.advance(drop);
                self.stats.dropped_bytes += drop as u64;
                self.stats.cleanups += 1;
            } else {
                break;
            }
        }
        None
    }

    /// Feed bytes and collect every frame recoverable in one pass
    pub fn extract(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.feed(data);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Bytes currently waiting for more data
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    pub fn limits(&self) -> &FrameLimits {
        &self.limits
    }
}
