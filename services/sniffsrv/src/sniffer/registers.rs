//! Register address tables
//!
//! Built once at startup and shared read-only. Three kinds of entries:
//! - `RegisterMapping`: numeric register with unit, scale, offset and class
//! - `StatusBitTable`: register whose bits are decoded into named booleans
//! - `SingleBitFlag`: register whose bit 0 is a single named boolean

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SniffSrvError};
use crate::protocols::modbus::constants::{TEMPERATURE_MAX, TEMPERATURE_MIN};

/// Semantic class of a reading; governs signedness, clamping and display units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorClass {
    #[default]
    None,
    Temperature,
    Pressure,
    Voltage,
    Current,
    Frequency,
    Speed,
    Power,
    VolumeFlowRate,
    /// Boolean decoded from a register bit
    Binary,
}

impl SensorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorClass::None => "none",
            SensorClass::Temperature => "temperature",
            SensorClass::Pressure => "pressure",
            SensorClass::Voltage => "voltage",
            SensorClass::Current => "current",
            SensorClass::Frequency => "frequency",
            SensorClass::Speed => "speed",
            SensorClass::Power => "power",
            SensorClass::VolumeFlowRate => "volume_flow_rate",
            SensorClass::Binary => "binary",
        }
    }
}

impl fmt::Display for SensorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_scale() -> f64 {
    1.0
}

/// Numeric register entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMapping {
    pub address: u16,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Multiplier applied after the offset
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Added to the raw value before scaling
    #[serde(default)]
    pub offset: i32,
    #[serde(default)]
    pub class: SensorClass,
}

impl RegisterMapping {
    pub fn new(
        address: u16,
        name: impl Into<String>,
        unit: impl Into<String>,
        scale: f64,
        offset: i32,
        class: SensorClass,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            unit: unit.into(),
            scale,
            offset,
            class,
        }
    }
}

/// One named bit of a status register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBit {
    pub bit: u8,
    pub name: String,
    /// Defaults to `1 << bit`
    #[serde(default)]
    pub mask: Option<u16>,
}

impl StatusBit {
    pub fn new(bit: u8, name: impl Into<String>, mask: u16) -> Self {
        Self {
            bit,
            name: name.into(),
            mask: Some(mask),
        }
    }

    #[inline]
    pub fn effective_mask(&self) -> u16 {
        self.mask
            .unwrap_or_else(|| 1u16.checked_shl(u32::from(self.bit)).unwrap_or(0))
    }
}

/// Status register decoded bit by bit; readings are named `"<prefix> <bit name>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBitTable {
    pub address: u16,
    pub prefix: String,
    pub bits: Vec<StatusBit>,
}

/// Register carrying one boolean in bit 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleBitFlag {
    pub address: u16,
    pub name: String,
}

/// Immutable address-indexed lookup for the decoder
#[derive(Debug, Clone)]
pub struct RegisterMap {
    registers: AHashMap<u16, RegisterMapping>,
    status_tables: AHashMap<u16, StatusBitTable>,
    flags: AHashMap<u16, SingleBitFlag>,
    temperature_min: f64,
    temperature_max: f64,
}

impl RegisterMap {
    /// Build and validate the lookup structures
    ///
    /// Rejects duplicate addresses within a kind, duplicate or out-of-range bit
    /// indices, zero masks and an empty temperature range. Bits are stored in
    /// ascending order so decoding is order-stable.
    pub fn new(
        registers: Vec<RegisterMapping>,
        status_tables: Vec<StatusBitTable>,
        flags: Vec<SingleBitFlag>,
        temperature_min: f64,
        temperature_max: f64,
    ) -> Result<Self> {
        if temperature_min.is_nan() || temperature_max.is_nan() || temperature_min >= temperature_max {
            return Err(SniffSrvError::config(format!(
                "decoder temperature range [{}, {}] is empty",
                temperature_min, temperature_max
            )));
        }

        let mut register_index = AHashMap::with_capacity(registers.len());
        for mapping in registers {
            if !mapping.scale.is_finite() {
                return Err(SniffSrvError::config(format!(
                    "register {} ({}) has non-finite scale",
                    mapping.address, mapping.name
                )));
            }
            let address = mapping.address;
            if register_index.insert(address, mapping).is_some() {
                return Err(SniffSrvError::config(format!(
                    "duplicate register mapping for address {}",
                    address
                )));
            }
        }

        let mut table_index = AHashMap::with_capacity(status_tables.len());
        for mut table in status_tables {
            table.bits.sort_by_key(|b| b.bit);
            for pair in table.bits.windows(2) {
                if pair[0].bit == pair[1].bit {
                    return Err(SniffSrvError::config(format!(
                        "status table {} defines bit {} twice",
                        table.address, pair[0].bit
                    )));
                }
            }
            for bit in &table.bits {
                if bit.bit > 15 || bit.effective_mask() == 0 {
                    return Err(SniffSrvError::config(format!(
                        "status table {} bit {} ({}) has an invalid index or zero mask",
                        table.address, bit.bit, bit.name
                    )));
                }
            }
            let address = table.address;
            if table_index.insert(address, table).is_some() {
                return Err(SniffSrvError::config(format!(
                    "duplicate status table for address {}",
                    address
                )));
            }
        }

        let mut flag_index = AHashMap::with_capacity(flags.len());
        for flag in flags {
            let address = flag.address;
            if flag_index.insert(address, flag).is_some() {
                return Err(SniffSrvError::config(format!(
                    "duplicate single-bit flag for address {}",
                    address
                )));
            }
        }

        Ok(Self {
            registers: register_index,
            status_tables: table_index,
            flags: flag_index,
            temperature_min,
            temperature_max,
        })
    }

    /// Built-in table for the heat pump outdoor unit
    pub fn heat_pump() -> Self {
        Self {
            registers: heat_pump_registers()
                .into_iter()
                .map(|m| (m.address, m))
                .collect(),
            status_tables: heat_pump_status_tables()
                .into_iter()
                .map(|t| (t.address, t))
                .collect(),
            flags: heat_pump_flags()
                .into_iter()
                .map(|f| (f.address, f))
                .collect(),
            temperature_min: TEMPERATURE_MIN,
            temperature_max: TEMPERATURE_MAX,
        }
    }

    #[inline]
    pub fn register(&self, address: u16) -> Option<&RegisterMapping> {
        self.registers.get(&address)
    }

    #[inline]
    pub fn status_table(&self, address: u16) -> Option<&StatusBitTable> {
        self.status_tables.get(&address)
    }

    #[inline]
    pub fn flag(&self, address: u16) -> Option<&SingleBitFlag> {
        self.flags.get(&address)
    }

    #[inline]
    pub fn temperature_range(&self) -> (f64, f64) {
        (self.temperature_min, self.temperature_max)
    }

    /// Register mappings ordered by address
    pub fn registers(&self) -> Vec<&RegisterMapping> {
        let mut all: Vec<_> = self.registers.values().collect();
        all.sort_by_key(|m| m.address);
        all
    }

    /// Names of every boolean reading the tables can produce, ordered by address then bit
    pub fn binary_sensor_names(&self) -> Vec<String> {
        let mut tables: Vec<_> = self.status_tables.values().collect();
        tables.sort_by_key(|t| t.address);
        let mut names: Vec<String> = tables
            .iter()
            .flat_map(|t| t.bits.iter().map(move |b| format!("{} {}", t.prefix, b.name)))
            .collect();

        let mut flags: Vec<_> = self.flags.values().collect();
        flags.sort_by_key(|f| f.address);
        names.extend(flags.iter().map(|f| f.name.clone()));
        names
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn status_bit_count(&self) -> usize {
        self.status_tables.values().map(|t| t.bits.len()).sum()
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::heat_pump()
    }
}

/// Numeric registers of the heat pump: control registers written by the
/// controller and measurement registers read back from the unit
pub fn heat_pump_registers() -> Vec<RegisterMapping> {
    use SensorClass::*;
    let temp = |address: u16, name: &str| {
        RegisterMapping::new(address, name, "°C", 0.01, -3000, Temperature)
    };

    vec![
        // Control registers
        RegisterMapping::new(1999, "Compressor Level set by CiC", "", 1.0, 0, None),
        RegisterMapping::new(2010, "Pump Mode set by CiC", "", 1.0, 0, None),
        RegisterMapping::new(2015, "Pump Level set by CiC", "%", 0.01, 0, None),
        RegisterMapping::new(3999, "Working Mode set by CiC", "", 1.0, 0, None),
        // Status and measurement registers
        RegisterMapping::new(2099, "Working Mode Actual", "", 1.0, 0, None),
        RegisterMapping::new(2100, "Compressor AC Voltage", "V", 1.0, 0, Voltage),
        RegisterMapping::new(2101, "Compressor AC Current", "A", 0.1, 0, Current),
        RegisterMapping::new(2102, "Compressor Frequency Demand", "Hz", 1.0, 0, Frequency),
        RegisterMapping::new(2103, "Compressor Frequency Actual", "Hz", 1.0, 0, Frequency),
        RegisterMapping::new(2104, "Fan Speed Maximum", "RPM", 1.0, 0, Speed),
        RegisterMapping::new(2105, "Fan Speed Actual", "RPM", 1.0, 0, Speed),
        RegisterMapping::new(2107, "Electric Expansion Valve", "p", 1.0, 0, None),
        RegisterMapping::new(2108, "Status Bits R2108", "", 1.0, 0, None),
        RegisterMapping::new(2109, "EV1 Steps", "p", 1.0, 0, None),
        temp(2110, "Outside Temperature"),
        temp(2111, "Evaporator Coil Temperature"),
        temp(2112, "Gas Discharge Temperature"),
        temp(2113, "Gas Return Temperature"),
        RegisterMapping::new(2116, "Evaporator Pressure", "bar", 0.1, 0, Pressure),
        RegisterMapping::new(2117, "Condenser Pressure", "bar", 0.1, 0, Pressure),
        RegisterMapping::new(2118, "Defrost Mode", "", 1.0, 0, None),
        RegisterMapping::new(2119, "Status Bits R2119", "", 1.0, 0, None),
        RegisterMapping::new(2120, "Status Bits R2120", "", 1.0, 0, None),
        RegisterMapping::new(2121, "Status Bits R2121", "", 1.0, 0, None),
        RegisterMapping::new(2122, "Firmware Version", "", 1.0, 0, None),
        RegisterMapping::new(2123, "EEPROM Version", "", 1.0, 0, None),
        temp(2131, "Condensing Temperature"),
        temp(2132, "Evaporating Temperature"),
        temp(2133, "Water In Temperature"),
        temp(2134, "Water Out Temperature"),
        temp(2135, "Condenser Coil Temperature"),
        RegisterMapping::new(2137, "Pump Power", "W", 0.1, 0, Power),
        RegisterMapping::new(2138, "Pump Flow", "L/h", 0.618, 0, VolumeFlowRate),
    ]
}

/// Status bit registers of the heat pump
pub fn heat_pump_status_tables() -> Vec<StatusBitTable> {
    vec![
        StatusBitTable {
            address: 2108,
            prefix: "R2108".to_string(),
            bits: vec![
                StatusBit::new(0, "Fan Low Speed Mode", 0x0001),
                StatusBit::new(2, "Bottom Heater", 0x0004),
                StatusBit::new(3, "Crankcase Heater", 0x0008),
                StatusBit::new(4, "Fan Defrost Speed Mode", 0x0010),
                StatusBit::new(5, "Fan High Speed Mode", 0x0020),
                StatusBit::new(6, "4way Valve", 0x0040),
                StatusBit::new(11, "Pump Relay", 0x0800),
            ],
        },
        // Alarm and info bits
        StatusBitTable {
            address: 2119,
            prefix: "R2119".to_string(),
            bits: vec![
                StatusBit::new(0, "Alarm - Main Line Current", 0x0001),
                StatusBit::new(3, "Info - Compressor Oil Return", 0x0008),
                StatusBit::new(4, "Alarm - High Pressure Switch", 0x0010),
                StatusBit::new(6, "Alarm - 1st Start Pre-heat", 0x0040),
                StatusBit::new(9, "Alarm - AC High/Low Voltage", 0x0200),
                StatusBit::new(12, "Alarm - Low Pressure Switch", 0x1000),
            ],
        },
    ]
}

/// Single-bit registers of the heat pump
pub fn heat_pump_flags() -> Vec<SingleBitFlag> {
    vec![SingleBitFlag {
        address: 2118,
        name: "Defrost Mode Active".to_string(),
    }]
}
