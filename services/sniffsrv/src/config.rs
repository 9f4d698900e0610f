//! Service configuration
//!
//! Layered with figment: built-in defaults, then the YAML file, then
//! `SNIFFSRV_*` environment variables (`__` separates nested keys, e.g.
//! `SNIFFSRV_SERVER__PORT=5020`). CLI overrides are applied by the binary.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SniffSrvError};
use crate::protocols::modbus::constants::{
    READ_CHUNK_SIZE, STATS_PUBLISH_INTERVAL, TEMPERATURE_MAX, TEMPERATURE_MIN,
};
use crate::protocols::modbus::FrameLimits;
use crate::sniffer::decoder::sanitize;
use crate::sniffer::registers::{
    heat_pump_flags, heat_pump_registers, heat_pump_status_tables, RegisterMap, RegisterMapping,
    SingleBitFlag, StatusBitTable,
};

pub const ENV_PREFIX: &str = "SNIFFSRV_";
pub const DEFAULT_CONFIG_PATH: &str = "config/sniffsrv.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4444,
            read_buffer_size: READ_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Valid frames between two statistics snapshots
    pub publish_interval: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            publish_interval: STATS_PUBLISH_INTERVAL,
        }
    }
}

/// Register decoding tables
///
/// Each table that is left out falls back to the built-in heat pump table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub registers: Option<Vec<RegisterMapping>>,
    pub status_tables: Option<Vec<StatusBitTable>>,
    pub single_bits: Option<Vec<SingleBitFlag>>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            temperature_min: TEMPERATURE_MIN,
            temperature_max: TEMPERATURE_MAX,
            registers: None,
            status_tables: None,
            single_bits: None,
        }
    }
}

impl DecoderConfig {
    /// Build the immutable lookup used by the engine
    pub fn build_register_map(&self) -> Result<RegisterMap> {
        RegisterMap::new(
            self.registers.clone().unwrap_or_else(heat_pump_registers),
            self.status_tables
                .clone()
                .unwrap_or_else(heat_pump_status_tables),
            self.single_bits.clone().unwrap_or_else(heat_pump_flags),
            self.temperature_min,
            self.temperature_max,
        )
    }
}

/// Naming of devices and readings towards the publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Prefix of every object id
    pub prefix: String,
    /// Display name of devices without an explicit name
    pub base_name: String,
    /// Display names keyed by device id, decimal ("1") or hex ("0x01")
    pub names: BTreeMap<String, String>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            prefix: "quatt".to_string(),
            base_name: "Quatt Heat Pump".to_string(),
            names: BTreeMap::new(),
        }
    }
}

fn parse_device_id(key: &str) -> Option<u8> {
    let key = key.trim();
    match key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}

impl DevicesConfig {
    pub fn display_name(&self, device_id: u8) -> String {
        self.names
            .iter()
            .find(|(key, _)| parse_device_id(key) == Some(device_id))
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| format!("{} {:02X}", self.base_name, device_id))
    }

    /// Stable key of a reading: `<prefix>_<id>_<sanitized name>`
    pub fn object_id(&self, device_id: u8, reading_name: &str) -> String {
        format!("{}_{:02x}_{}", self.prefix, device_id, sanitize(reading_name))
    }

    fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(SniffSrvError::config("devices.prefix cannot be empty"));
        }
        for key in self.names.keys() {
            if parse_device_id(key).is_none() {
                return Err(SniffSrvError::config(format!(
                    "devices.names key '{}' is not a device id (0-255 or 0x00-0xFF)",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
    /// Also write a daily rolling file under `dir`
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: false,
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.file.then(|| PathBuf::from(&self.dir))
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    pub server: ServerConfig,
    pub framing: FrameLimits,
    pub stats: StatsConfig,
    pub decoder: DecoderConfig,
    pub devices: DevicesConfig,
    pub logging: LoggingConfig,
}

impl SnifferConfig {
    /// Provider chain without extraction, for callers that add their own layers
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(SnifferConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate; a missing file leaves the defaults in place
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: SnifferConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SniffSrvError::config("server.host cannot be empty"));
        }
        if self.server.read_buffer_size == 0 {
            return Err(SniffSrvError::config(
                "server.read_buffer_size must be greater than 0",
            ));
        }
        self.framing.validate()?;
        if self.stats.publish_interval == 0 {
            return Err(SniffSrvError::config(
                "stats.publish_interval must be greater than 0",
            ));
        }
        self.devices.validate()?;
        // Table checks (duplicates, masks, temperature range) live in RegisterMap::new
        self.decoder.build_register_map()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                SniffSrvError::config(format!(
                    "Invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }
}
