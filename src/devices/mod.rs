//! Concrete models of the heater and the electric meter, and the local
//! architectures composing them.

pub mod architectures;
/// Heater relay, electricity, temperature and test driver models.
pub mod heater;
/// Electric meter model.
pub mod meter;

pub use architectures::{DeviceSetup, local_architecture};
pub use heater::{HeaterParams, HeaterState};
pub use meter::MeterParams;
