//! Co-simulation of a heater and an electric meter for software-in-the-loop
//! testing of appliance controllers.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
/// Heater and meter models, and the catalogue of local architectures.
pub mod devices;
pub mod error;
pub mod io;
pub mod scenario;
/// Simulation kernel: events, variables, architectures and the simulators.
pub mod sim;
