//! Protocol layer
//!
//! Only Modbus RTU is sniffed today; the module split mirrors the service's
//! other protocol crates so a second bus type can sit next to it.

pub mod modbus;
