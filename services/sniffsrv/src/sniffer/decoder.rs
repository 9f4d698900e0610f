//! Register value decoding
//!
//! Turns the value sequence of a read response into named readings using the
//! register tables. Pure: same start address and values, same readings, same order.

use std::fmt;

use serde::Serialize;

use super::registers::{RegisterMap, RegisterMapping, SensorClass};

/// Where a reading came from: a whole register or one bit of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSource {
    Register(u16),
    Bit { address: u16, bit: u8 },
}

impl fmt::Display for RegisterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterSource::Register(address) => write!(f, "{}", address),
            RegisterSource::Bit { address, bit } => write!(f, "{}b{}", address, bit),
        }
    }
}

impl Serialize for RegisterSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Bool(bool),
}

impl ReadingValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            ReadingValue::Number(v) => Some(v),
            ReadingValue::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ReadingValue::Bool(b) => Some(b),
            ReadingValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(v) => write!(f, "{:.2}", v),
            ReadingValue::Bool(true) => f.write_str("ON"),
            ReadingValue::Bool(false) => f.write_str("OFF"),
        }
    }
}

/// One decoded reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub name: String,
    pub value: ReadingValue,
    pub unit: String,
    pub class: SensorClass,
    pub source: RegisterSource,
    /// Raw register value after sign conversion
    pub raw: i32,
}

/// Lower-case name with spaces, dashes and slashes replaced by underscores
pub fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' => '_',
            other => other,
        })
        .collect()
}

fn numeric_reading(mapping: &RegisterMapping, raw: u16, range: (f64, f64)) -> SensorReading {
    let is_temperature = mapping.class == SensorClass::Temperature;

    let mut value = i32::from(raw);
    if is_temperature && value > i32::from(i16::MAX) {
        value -= 65536;
    }

    let mut scaled = (f64::from(value) + f64::from(mapping.offset)) * mapping.scale;
    if is_temperature {
        scaled = scaled.clamp(range.0, range.1);
    }

    SensorReading {
        name: mapping.name.clone(),
        value: ReadingValue::Number(scaled),
        unit: mapping.unit.clone(),
        class: mapping.class,
        source: RegisterSource::Register(mapping.address),
        raw: value,
    }
}

/// Decode `values` read starting at register `start`
///
/// For every address: the numeric reading first (if mapped), then one boolean
/// per bit of its status table, then its single-bit flag. Unmapped addresses
/// produce nothing. Values past address 65535 are ignored.
pub fn decode(map: &RegisterMap, start: u16, values: &[u16]) -> Vec<SensorReading> {
    let range = map.temperature_range();
    let mut readings = Vec::new();

    for (i, &raw) in values.iter().enumerate() {
        let Some(address) = u16::try_from(i)
            .ok()
            .and_then(|offset| start.checked_add(offset))
        else {
            break;
        };

        if let Some(mapping) = map.register(address) {
            readings.push(numeric_reading(mapping, raw, range));
        }

        if let Some(table) = map.status_table(address) {
            for bit in &table.bits {
                readings.push(SensorReading {
                    name: format!("{} {}", table.prefix, bit.name),
                    value: ReadingValue::Bool(raw & bit.effective_mask() != 0),
                    unit: String::new(),
                    class: SensorClass::Binary,
                    source: RegisterSource::Bit {
                        address,
                        bit: bit.bit,
                    },
                    raw: i32::from(raw),
                });
            }
        }

        if let Some(flag) = map.flag(address) {
            readings.push(SensorReading {
                name: flag.name.clone(),
                value: ReadingValue::Bool(raw & 0x0001 != 0),
                unit: String::new(),
                class: SensorClass::Binary,
                source: RegisterSource::Bit { address, bit: 0 },
                raw: i32::from(raw),
            });
        }
    }

    readings
}
