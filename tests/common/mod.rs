//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use appliance_sil::devices::architectures::{DeviceSetup, local_architecture};
use appliance_sil::devices::heater::{ExternalTemperatureParams, TimelineEntry};
use appliance_sil::devices::{HeaterParams, MeterParams};
use appliance_sil::sim::engine::{RunOutcome, Simulator};
use appliance_sil::sim::event::EventKind;
use appliance_sil::sim::report::FinalReport;
use appliance_sil::sim::time::SimTime;
use appliance_sil::sim::types::{ModelUri, OwnerFields, RunParameters};

/// Heating power of the round trip's `set_power` action (W).
pub const REDUCED_POWER_W: f64 = 880.0;

/// On at 5 min, heat at 10 min, 880 W at 14.5 min, off at 16.5 min.
pub fn round_trip_timeline() -> Vec<TimelineEntry> {
    vec![
        TimelineEntry::new(SimTime::from_minutes(5.0), EventKind::SwitchOn),
        TimelineEntry::new(SimTime::from_minutes(10.0), EventKind::Heat),
        TimelineEntry::new(
            SimTime::from_minutes(14.5),
            EventKind::SetPower {
                power_w: REDUCED_POWER_W,
            },
        ),
        TimelineEntry::new(SimTime::from_minutes(16.5), EventKind::SwitchOff),
    ]
}

/// Energy of the round trip with default heater parameters (kWh).
pub fn round_trip_consumption_kwh() -> f64 {
    let p = HeaterParams::default();
    let idle = p.tension_v * (p.idle_power_w / p.tension_v) * 5.0 / 60.0;
    let full = p.tension_v * (p.max_power_w / p.tension_v) * 4.5 / 60.0;
    let reduced = p.tension_v * (REDUCED_POWER_W / p.tension_v) * 2.0 / 60.0;
    (idle + full + reduced) / 1000.0
}

/// Default devices with a constant 19 °C outside and the given script.
pub fn scripted_setup(timeline: Vec<TimelineEntry>) -> DeviceSetup {
    DeviceSetup {
        heater: HeaterParams::default(),
        external_temperature: ExternalTemperatureParams::constant(19.0),
        meter: MeterParams::default(),
        tester: Some(timeline),
    }
}

/// Builds the local architecture `id` and returns a ready simulator and
/// the owner fields handed to it.
pub fn simulator(id: &str, setup: &DeviceSetup) -> (Simulator, OwnerFields) {
    let architecture = local_architecture(id, setup).unwrap_or_else(|e| panic!("{e}"));
    let mut simulator = Simulator::construct(&architecture).unwrap_or_else(|e| panic!("{e}"));
    let owner = OwnerFields::new();
    simulator.set_run_parameters(RunParameters {
        record_trace: true,
        ..RunParameters::with_owner(owner.clone())
    });
    (simulator, owner)
}

/// Runs architecture `id` detached for `duration_h` hours from time zero.
pub fn run(id: &str, setup: &DeviceSetup, duration_h: f64) -> (RunOutcome, OwnerFields) {
    let (mut simulator, owner) = simulator(id, setup);
    let outcome = simulator
        .run_detached(SimTime::ZERO, duration_h)
        .unwrap_or_else(|e| panic!("{e}"));
    (outcome, owner)
}

/// Final report of `uri` in `outcome`.
pub fn report<'a>(outcome: &'a RunOutcome, uri: &str) -> &'a FinalReport {
    let uri = ModelUri::from(uri);
    outcome
        .reports
        .iter()
        .find(|r| r.model == uri)
        .unwrap_or_else(|| panic!("no report for {uri}"))
}

/// Numeric line `label` of the report of `uri`.
pub fn value(outcome: &RunOutcome, uri: &str, label: &str) -> f64 {
    report(outcome, uri)
        .value_of(label)
        .unwrap_or_else(|| panic!("no {label} in report of {uri}"))
}
