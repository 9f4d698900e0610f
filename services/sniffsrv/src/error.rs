//! Error handling for the sniffer service
//!
//! Frame-level errors are absorbed by the engine and only show up in the
//! statistics; the variants here surface at configuration, startup and transport
//! boundaries.

use thiserror::Error;

/// Sniffer Service Error Type
#[derive(Error, Debug, Clone)]
pub enum SniffSrvError {
    /// Configuration-related errors (loading, validation, register tables)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors (listener bind, socket reads)
    #[error("IO error: {0}")]
    IoError(String),

    /// Protocol framing errors (frame too short, unexpected layout)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Payload decode errors (matched request lacks an address, malformed read response)
    #[error("Decode error: {0}")]
    DecodeError(String),
}

/// Result type alias for the sniffer service
pub type Result<T> = std::result::Result<T, SniffSrvError>;

impl SniffSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        SniffSrvError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        SniffSrvError::IoError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        SniffSrvError::ProtocolError(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        SniffSrvError::DecodeError(msg.into())
    }
}

impl From<std::io::Error> for SniffSrvError {
    fn from(err: std::io::Error) -> Self {
        SniffSrvError::IoError(err.to_string())
    }
}

impl From<figment::Error> for SniffSrvError {
    fn from(err: figment::Error) -> Self {
        SniffSrvError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SniffSrvError::decode("byte count missing");
        assert_eq!(err.to_string(), "Decode error: byte count missing");

        let err = SniffSrvError::config("max_frame_size > 256");
        assert!(matches!(err, SniffSrvError::ConfigError(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: SniffSrvError = io.into();
        assert!(matches!(err, SniffSrvError::IoError(ref m) if m.contains("reset by peer")));
    }
}
