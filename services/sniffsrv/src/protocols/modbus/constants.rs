//! Modbus RTU constants used by the passive frame recovery
//!
//! Frame size limits come from the RS485 ADU limit of 256 bytes; the buffer
//! limits bound how much unsynchronized data a connection may accumulate.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Smallest frame accepted by the extractor: slave id + function code + CRC(2)
pub const MIN_FRAME_SIZE: usize = 4;

/// Largest RTU ADU allowed on a Modbus serial line
pub const MAX_FRAME_SIZE: usize = 256;

/// Fixed size of a read request / write-single request / write-multiple response:
/// slave id(1) + function code(1) + address(2) + count or value(2) + CRC(2)
pub const FIXED_REQUEST_LEN: usize = 8;

/// Size of the trailing CRC
pub const CRC_LEN: usize = 2;

// ============================================================================
// Buffer Management
// ============================================================================

/// Unsynchronized bytes a connection may hold before a lossy cleanup happens
pub const MAX_BUFFER_SIZE: usize = 512;

/// Bytes dropped from the front of the buffer by one cleanup step
pub const BUFFER_CLEANUP_SIZE: usize = 256;

/// Socket read chunk size
pub const READ_CHUNK_SIZE: usize = 1024;

// ============================================================================
// CRC
// ============================================================================

/// Modbus CRC16 initial value
pub const MODBUS_CRC_INIT: u16 = 0xFFFF;

/// Modbus CRC16 polynomial (bit-reflected 0x8005)
pub const MODBUS_CRC_POLY: u16 = 0xA001;

// ============================================================================
// Function Codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set in the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Decoding & Statistics Defaults
// ============================================================================

/// Lower clamp for temperature-class readings (°C)
pub const TEMPERATURE_MIN: f64 = -30.0;

/// Upper clamp for temperature-class readings (°C)
pub const TEMPERATURE_MAX: f64 = 150.0;

/// Valid frames between two statistics snapshots
pub const STATS_PUBLISH_INTERVAL: u64 = 50;

/// Human-readable function code name; the exception bit is ignored
pub fn function_code_description(fc: u8) -> &'static str {
    match fc & !EXCEPTION_FLAG {
        0x01 => "Read Coils",
        0x02 => "Read Discrete Inputs",
        0x03 => "Read Holding Registers",
        0x04 => "Read Input Registers",
        0x05 => "Write Single Coil",
        0x06 => "Write Single Register",
        0x0F => "Write Multiple Coils",
        0x10 => "Write Multiple Registers",
        0x17 => "Read/Write Multiple Registers",
        _ => "Unknown Function",
    }
}

/// Standard exception code description
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
