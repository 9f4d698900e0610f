//! Common command-line arguments for the sniffer services
//!
//! Provides a unified argument structure that can be extended by individual services

#[cfg(feature = "cli")]
use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file path (YAML)
    #[cfg_attr(
        feature = "cli",
        clap(short = 'c', long, default_value = "config/sniffsrv.yaml", env = "SNIFFSRV_CONFIG")
    )]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[cfg_attr(feature = "cli", clap(short = 'l', long, env = "RUST_LOG"))]
    pub log_level: Option<String>,

    /// Listen host override (e.g., 0.0.0.0)
    #[cfg_attr(feature = "cli", clap(long))]
    pub host: Option<String>,

    /// Listen port override
    #[cfg_attr(feature = "cli", clap(short = 'p', long))]
    pub port: Option<u16>,

    /// Enable debug mode with verbose output
    #[cfg_attr(feature = "cli", clap(long, env = "DEBUG"))]
    pub debug: bool,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: "config/sniffsrv.yaml".to_string(),
            log_level: None,
            host: None,
            port: None,
            debug: false,
            no_color: false,
            validate: false,
        }
    }
}

impl ServiceArgs {
    /// Effective log level: `--debug` forces debug, otherwise the explicit level or the fallback
    pub fn effective_log_level(&self, fallback: &str) -> String {
        if self.debug {
            return "debug".to_string();
        }
        self.log_level
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}
