//! Electric meter summing the currents of the appliances it meters.

pub mod electricity;

pub use electricity::{ElectricMeter, MeterParams};

pub const METER_URI: &str = "electric-meter";

/// Total current through the meter, in amperes.
pub const METER_CURRENT: &str = "currentIntensity";
/// Meter import bound to the heater's drawn current.
pub const HEATER_CURRENT: &str = "heaterCurrent";
