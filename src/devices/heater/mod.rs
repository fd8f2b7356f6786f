//! Physical and discrete models of a room heater.
//!
//! The heater is split into a discrete relay ([`state`]), an electricity
//! model ([`electricity`]) exporting the drawn current, a room temperature
//! model ([`temperature`]) importing the outside temperature
//! ([`external_temperature`]), and a scripted event source for unit
//! tests ([`tester`]).

use std::fmt;

use serde::Serialize;

use crate::sim::event::EventType;

pub mod electricity;
pub mod external_temperature;
pub mod state;
pub mod temperature;
pub mod tester;

pub use electricity::HeaterElectricity;
pub use external_temperature::{ExternalTemperature, ExternalTemperatureParams};
pub use state::HeaterStateModel;
pub use temperature::HeaterTemperature;
pub use tester::{HeaterUnitTester, TimelineEntry};

pub const STATE_URI: &str = "heater-state";
pub const ELECTRICITY_URI: &str = "heater-electricity";
pub const TEMPERATURE_URI: &str = "heater-temperature";
pub const EXTERNAL_TEMPERATURE_URI: &str = "heater-external-temperature";
pub const TESTER_URI: &str = "heater-unit-tester";

/// Current drawn by the heater, in amperes.
pub const CURRENT_INTENSITY: &str = "currentIntensity";
/// Room temperature, in °C.
pub const CURRENT_TEMPERATURE: &str = "currentTemperature";
/// Outside temperature, in °C.
pub const EXTERNAL_TEMPERATURE: &str = "externalTemperature";

/// Owner field receiving the instantaneous electric power, in watts.
pub const OWNER_POWER_FIELD: &str = "heaterPower";

/// Events a heater's controller can send.
pub const HEATER_EVENTS: [EventType; 5] = EventType::ALL;

/// Discrete state of the heater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaterState {
    #[default]
    Off,
    On,
    Heating,
}

impl HeaterState {
    /// Next state after `event`; `None` when the event does not apply.
    pub fn after(self, event: EventType) -> Option<HeaterState> {
        match (self, event) {
            (HeaterState::Off, EventType::SwitchOn) => Some(HeaterState::On),
            (HeaterState::On | HeaterState::Heating, EventType::SwitchOff) => {
                Some(HeaterState::Off)
            }
            (HeaterState::On, EventType::Heat) => Some(HeaterState::Heating),
            (HeaterState::Heating, EventType::DoNotHeat) => Some(HeaterState::On),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HeaterState::Off => "OFF",
            HeaterState::On => "ON",
            HeaterState::Heating => "HEATING",
        }
    }
}

impl fmt::Display for HeaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical constants of one heater, in watts, volts, °C and hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaterParams {
    pub tension_v: f64,
    pub max_power_w: f64,
    /// Draw when switched on but not heating.
    pub idle_power_w: f64,
    pub plate_temperature_c: f64,
    /// Transfer constant toward the outside temperature, in hours.
    pub insulation_transfer_constant: f64,
    /// Heating transfer constant at full power, in hours.
    pub min_heating_transfer_constant: f64,
    pub initial_temperature_c: f64,
    /// Euler integration step, in hours.
    pub step_h: f64,
    /// Elapsed durations below this are not integrated, in hours.
    pub tolerance_h: f64,
}

impl Default for HeaterParams {
    fn default() -> Self {
        Self {
            tension_v: 220.0,
            max_power_w: 2000.0,
            idle_power_w: 22.0,
            plate_temperature_c: 300.0,
            insulation_transfer_constant: 12.5,
            min_heating_transfer_constant: 40.0,
            initial_temperature_c: 19.0,
            step_h: 1.0 / 60.0,
            tolerance_h: 1e-4,
        }
    }
}

impl HeaterParams {
    /// Heating transfer constant at `power_w`: inversely proportional to
    /// the power, equal to the minimum constant at full power.
    pub fn heat_transfer_constant(&self, power_w: f64) -> f64 {
        let c = 1.0 / (self.min_heating_transfer_constant * self.max_power_w);
        1.0 / (c * power_w)
    }

    /// Current drawn in `state` at heating power `power_w`.
    pub fn current_a(&self, state: HeaterState, power_w: f64) -> f64 {
        match state {
            HeaterState::Off => 0.0,
            HeaterState::On => self.idle_power_w / self.tension_v,
            HeaterState::Heating => power_w / self.tension_v,
        }
    }

    /// Returns `true` when `power_w` lies within `[0, max_power_w]`.
    pub fn accepts_power(&self, power_w: f64) -> bool {
        (0.0..=self.max_power_w).contains(&power_w)
    }

    /// Checks a power change requested in `state`, naming the violated
    /// condition on refusal.
    pub fn check_power_change(&self, state: HeaterState, power_w: f64) -> Result<(), String> {
        if state == HeaterState::Off {
            return Err(format!("set power to {power_w} W while the heater is OFF"));
        }
        if !self.accepts_power(power_w) {
            return Err(format!(
                "power {power_w} W outside [0, {}] W",
                self.max_power_w
            ));
        }
        Ok(())
    }
}
