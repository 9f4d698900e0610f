//! Shared bootstrap library for the sniffer services
//!
//! Provides the pieces every service binary needs before its own logic starts:
//! - logging initialization (console + optional daily rolling file)
//! - shutdown signal handling
//! - common command-line arguments
//! - hex formatting for raw frame dumps

pub mod bootstrap_args;
pub mod hex;
pub mod logging;
pub mod shutdown;

pub use bootstrap_args::ServiceArgs;
pub use logging::{LogConfig, LogGuard, LoggingError};

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;

#[cfg(feature = "cli")]
pub use clap::Parser;
