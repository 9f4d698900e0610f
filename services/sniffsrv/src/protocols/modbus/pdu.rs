//! Payload accessors and human-readable summaries for sniffed frames
//!
//! All readers are bounds-checked: a frame that is CRC-valid but shaped unlike its
//! function code yields a decode error (or a "(parse error)" summary), never a panic.

use std::fmt::Write;

use super::constants::{
    exception_description, function_code_description, EXCEPTION_FLAG, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_REGISTER,
};
use super::frame::RawFrame;
use crate::error::{Result, SniffSrvError};

/// Number of register values shown in a response summary
const SUMMARY_VALUES: usize = 8;

#[inline]
fn be_u16(payload: &[u8], offset: usize) -> Option<u16> {
    let hi = *payload.get(offset)?;
    let lo = *payload.get(offset + 1)?;
    Some(u16::from_be_bytes([hi, lo]))
}

/// Address field (first payload word) of a request frame
pub fn start_address(request: &RawFrame) -> Result<u16> {
    be_u16(request.payload(), 0).ok_or_else(|| {
        SniffSrvError::decode(format!(
            "Request FC={:02X} from device {:02X} has no address field ({} bytes)",
            request.function_code(),
            request.device_id(),
            request.len()
        ))
    })
}

/// Second payload word of a request: register count for reads, value for FC06
pub fn second_word(request: &RawFrame) -> Result<u16> {
    be_u16(request.payload(), 2).ok_or_else(|| {
        SniffSrvError::decode(format!(
            "Request FC={:02X} from device {:02X} is missing its count/value field",
            request.function_code(),
            request.device_id()
        ))
    })
}

/// Register values of a read holding/input registers response
///
/// Value count is `byte_count / 2`, a trailing odd byte is ignored, and a payload
/// shorter than the declared byte count yields the values that are present.
pub fn read_response_values(response: &RawFrame) -> Result<Vec<u16>> {
    let payload = response.payload();
    let (&byte_count, data) = payload.split_first().ok_or_else(|| {
        SniffSrvError::decode(format!(
            "Read response from device {:02X} has no byte count",
            response.device_id()
        ))
    })?;

    let declared = usize::from(byte_count) / 2;
    let available = data.len() / 2;
    Ok(data
        .chunks_exact(2)
        .take(declared.min(available))
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Exception code of an error response
pub fn exception_code(response: &RawFrame) -> Option<u8> {
    if response.function_code() & EXCEPTION_FLAG == 0 {
        return None;
    }
    response.payload().first().copied()
}

/// One-line summary of a request frame
pub fn describe_request(frame: &RawFrame) -> String {
    let fc = frame.function_code();
    match fc {
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS | FC_WRITE_SINGLE_REGISTER => {
            match (start_address(frame), second_word(frame)) {
                (Ok(addr), Ok(word)) => {
                    let label = if fc == FC_WRITE_SINGLE_REGISTER {
                        "Value"
                    } else {
                        "Count"
                    };
                    format!(
                        "{} | Start: {} (0x{:04X}) | {}: {}",
                        function_code_description(fc),
                        addr,
                        addr,
                        label,
                        word
                    )
                },
                _ => format!("Function 0x{:02X} (parse error)", fc),
            }
        },
        _ => format!("Function 0x{:02X} ({})", fc, function_code_description(fc)),
    }
}

/// One-line summary of a response frame
pub fn describe_response(frame: &RawFrame) -> String {
    let fc = frame.function_code();
    if fc & EXCEPTION_FLAG != 0 {
        return match exception_code(frame) {
            Some(code) => format!(
                "ERROR Response | Function: 0x{:02X} | Code: {:02X} ({})",
                fc & !EXCEPTION_FLAG,
                code,
                exception_description(code)
            ),
            None => format!("Function 0x{:02X} Response (parse error)", fc),
        };
    }

    match fc {
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            let byte_count = frame.payload().first().copied().unwrap_or(0);
            match read_response_values(frame) {
                Ok(values) => {
                    let mut shown = String::new();
                    for (i, v) in values.iter().take(SUMMARY_VALUES).enumerate() {
                        if i > 0 {
                            shown.push_str(", ");
                        }
                        let _ = write!(shown, "{}", v);
                    }
                    if values.len() > SUMMARY_VALUES {
                        shown.push_str("...");
                    }
                    format!("Read Response | Bytes: {} | Values: [{}]", byte_count, shown)
                },
                Err(_) => format!("Function 0x{:02X} Response (parse error)", fc),
            }
        },
        _ => format!("Function 0x{:02X} Response ({})", fc, function_code_description(fc)),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocols::modbus::crc;
    use bytes::Bytes;
    use std::time::Instant;

    fn frame(body: &[u8]) -> RawFrame {
        let mut v = body.to_vec();
        crc::append(&mut v);
        RawFrame::parse(Bytes::from(v), Instant::now()).unwrap()
    }

    #[test]
    fn test_start_address_and_count() {
        let req = frame(&[0x01, 0x03, 0x08, 0x34, 0x00, 0x0A]);
        assert_eq!(start_address(&req).unwrap(), 2100);
        assert_eq!(second_word(&req).unwrap(), 10);
    }

    #[test]
    fn test_start_address_missing() {
        let req = frame(&[0x01, 0x03]);
        assert!(matches!(
            start_address(&req),
            Err(SniffSrvError::DecodeError(_))
        ));
    }

    #[test]
    fn test_read_response_values() {
        let resp = frame(&[0x01, 0x03, 0x04, 0x00, 0xE6, 0x00, 0x0C]);
        assert_eq!(read_response_values(&resp).unwrap(), vec![230, 12]);
    }

    #[test]
    fn test_read_response_odd_byte_count_ignores_trailing_byte() {
        let resp = frame(&[0x01, 0x03, 0x05, 0x00, 0x01, 0x00, 0x02, 0x07]);
        assert_eq!(read_response_values(&resp).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_read_response_truncated_payload() {
        // Declares 6 bytes, carries 3
        let resp = frame(&[0x01, 0x03, 0x06, 0x00, 0x01, 0x00]);
        assert_eq!(read_response_values(&resp).unwrap(), vec![1]);
    }

    #[test]
    fn test_read_response_without_byte_count() {
        let resp = frame(&[0x01, 0x03]);
        assert!(read_response_values(&resp).is_err());
    }

    #[test]
    fn test_exception_code() {
        let resp = frame(&[0x01, 0x83, 0x02]);
        assert_eq!(exception_code(&resp), Some(0x02));
        let normal = frame(&[0x01, 0x03, 0x00]);
        assert_eq!(exception_code(&normal), None);
    }

    #[test]
    fn test_describe_request() {
        let read = frame(&[0x01, 0x04, 0x08, 0x34, 0x00, 0x0A]);
        assert_eq!(
            describe_request(&read),
            "Read Input Registers | Start: 2100 (0x0834) | Count: 10"
        );

        let write = frame(&[0x01, 0x06, 0x07, 0xCF, 0x00, 0x03]);
        assert_eq!(
            describe_request(&write),
            "Write Single Register | Start: 1999 (0x07CF) | Value: 3"
        );

        let short = frame(&[0x01, 0x03]);
        assert_eq!(describe_request(&short), "Function 0x03 (parse error)");

        let coils = frame(&[0x01, 0x01, 0x00, 0x00, 0x00, 0x08]);
        assert_eq!(describe_request(&coils), "Function 0x01 (Read Coils)");
    }

    #[test]
    fn test_describe_response() {
        let err = frame(&[0x01, 0x83, 0x02]);
        assert_eq!(
            describe_response(&err),
            "ERROR Response | Function: 0x03 | Code: 02 (Illegal Data Address)"
        );

        let read = frame(&[0x01, 0x03, 0x04, 0x00, 0xE6, 0x00, 0x0C]);
        assert_eq!(
            describe_response(&read),
            "Read Response | Bytes: 4 | Values: [230, 12]"
        );

        let mut body = vec![0x01, 0x03, 20];
        for v in 0u16..10 {
            body.extend_from_slice(&v.to_be_bytes());
        }
        let long = frame(&body);
        assert_eq!(
            describe_response(&long),
            "Read Response | Bytes: 20 | Values: [0, 1, 2, 3, 4, 5, 6, 7...]"
        );
    }
}
