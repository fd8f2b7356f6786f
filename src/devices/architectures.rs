//! Catalogue of the local architectures a heater or meter component can
//! build, addressed by identifier.

use crate::error::{ArchitectureError, SimError};
use crate::sim::architecture::{Architecture, ArchitectureBuilder, EventEndpoint};
use crate::sim::types::VariableId;

use super::heater::{
    CURRENT_INTENSITY, ELECTRICITY_URI, EXTERNAL_TEMPERATURE, EXTERNAL_TEMPERATURE_URI,
    ExternalTemperature, ExternalTemperatureParams, HEATER_EVENTS, HeaterElectricity, HeaterParams,
    HeaterStateModel, HeaterTemperature, HeaterUnitTester, STATE_URI, TEMPERATURE_URI, TESTER_URI,
    TimelineEntry,
};
use super::meter::{ElectricMeter, HEATER_CURRENT, METER_URI, MeterParams};

/// All heater models in one scope; the electricity export stays unused.
pub const UNIT_TEST: &str = "heater-unit-test";
/// Electricity relocated next to the meter, state events re-exported.
pub const INTEGRATION: &str = "heater-integration";
/// Inner scope of [`INTEGRATION`] holding state and temperature.
pub const HEATER_LOCAL: &str = "heater-local";
/// Inner scope of [`INTEGRATION`] holding the meter and metered electricity.
pub const METER_LOCAL: &str = "electric-meter-local";

pub const LOCAL_ARCHITECTURES: &[&str] = &[UNIT_TEST, INTEGRATION];

/// Model whose inbox receives the controller's events.
pub const CONTROL_TARGET: &str = STATE_URI;

/// Parameters of every model an architecture may instantiate.
#[derive(Debug, Clone, Default)]
pub struct DeviceSetup {
    pub heater: HeaterParams,
    pub external_temperature: ExternalTemperatureParams,
    pub meter: MeterParams,
    /// Scripted events; when set, a tester model drives the heater.
    pub tester: Option<Vec<TimelineEntry>>,
}

/// Builds the local architecture `id`.
///
/// # Errors
///
/// Returns [`ArchitectureError::UnknownLocalArchitecture`] for an unknown
/// identifier, or any validation error of the composed architecture.
pub fn local_architecture(id: &str, setup: &DeviceSetup) -> Result<Architecture, SimError> {
    let architecture = match id {
        UNIT_TEST => unit_test(setup)?,
        INTEGRATION => integration(setup)?,
        other => return Err(ArchitectureError::UnknownLocalArchitecture(other.to_string()).into()),
    };
    Ok(architecture)
}

fn temperature_binding() -> (VariableId, Vec<VariableId>) {
    (
        VariableId::new(EXTERNAL_TEMPERATURE_URI, EXTERNAL_TEMPERATURE),
        vec![VariableId::new(TEMPERATURE_URI, EXTERNAL_TEMPERATURE)],
    )
}

fn with_tester(builder: ArchitectureBuilder, setup: &DeviceSetup, sink: &str) -> ArchitectureBuilder {
    match &setup.tester {
        Some(timeline) => builder
            .model(HeaterUnitTester::descriptor(TESTER_URI, timeline.clone()))
            .route_types(TESTER_URI, &[sink], &HEATER_EVENTS),
        None => builder,
    }
}

fn unit_test(setup: &DeviceSetup) -> Result<Architecture, ArchitectureError> {
    let (export, imports) = temperature_binding();
    let builder = Architecture::builder(UNIT_TEST)
        .model(HeaterStateModel::descriptor(STATE_URI))
        .model(HeaterElectricity::descriptor(ELECTRICITY_URI, setup.heater))
        .model(HeaterTemperature::descriptor(TEMPERATURE_URI, setup.heater))
        .model(ExternalTemperature::descriptor(
            EXTERNAL_TEMPERATURE_URI,
            setup.external_temperature,
        ))
        .route_types(STATE_URI, &[ELECTRICITY_URI, TEMPERATURE_URI], &HEATER_EVENTS)
        .bind(export, imports);
    with_tester(builder, setup, STATE_URI).build()
}

fn integration(setup: &DeviceSetup) -> Result<Architecture, ArchitectureError> {
    let (export, imports) = temperature_binding();
    let heater_local = Architecture::builder(HEATER_LOCAL)
        .model(HeaterStateModel::descriptor(STATE_URI))
        .model(HeaterTemperature::descriptor(TEMPERATURE_URI, setup.heater))
        .model(ExternalTemperature::descriptor(
            EXTERNAL_TEMPERATURE_URI,
            setup.external_temperature,
        ))
        .route_types(STATE_URI, &[TEMPERATURE_URI], &HEATER_EVENTS)
        .reexport_types(STATE_URI, &HEATER_EVENTS)
        .bind(export, imports);
    let heater_local = HEATER_EVENTS
        .iter()
        .fold(heater_local, |b, &t| {
            b.import(t, vec![EventEndpoint::new(STATE_URI, t)])
        })
        .build()?;

    let meter_local = Architecture::builder(METER_LOCAL)
        .model(HeaterElectricity::descriptor(ELECTRICITY_URI, setup.heater))
        .model(ElectricMeter::descriptor(METER_URI, setup.meter, &[HEATER_CURRENT]))
        .bind(
            VariableId::new(ELECTRICITY_URI, CURRENT_INTENSITY),
            vec![VariableId::new(METER_URI, HEATER_CURRENT)],
        );
    let meter_local = HEATER_EVENTS
        .iter()
        .fold(meter_local, |b, &t| {
            b.import(t, vec![EventEndpoint::new(ELECTRICITY_URI, t)])
        })
        .build()?;

    let builder = Architecture::builder(INTEGRATION)
        .child(heater_local)
        .child(meter_local)
        .route_types(HEATER_LOCAL, &[METER_LOCAL], &HEATER_EVENTS);
    with_tester(builder, setup, HEATER_LOCAL).build()
}
