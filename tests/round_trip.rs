//! The scripted on/heat/reduce/off round trip in the unit-test architecture.

mod common;

use appliance_sil::devices::architectures::UNIT_TEST;
use appliance_sil::devices::heater::{
    ELECTRICITY_URI, OWNER_POWER_FIELD, STATE_URI, TEMPERATURE_URI, TESTER_URI,
};
use appliance_sil::sim::report::{FINAL_STATE, MEAN_TEMPERATURE, TOTAL_CONSUMPTION};
use appliance_sil::sim::time::SimTime;
use appliance_sil::sim::types::{ModelUri, VariableId};

#[test]
fn consumption_matches_the_timeline() {
    let setup = common::scripted_setup(common::round_trip_timeline());
    let (outcome, _) = common::run(UNIT_TEST, &setup, 1.0);
    let kwh = common::value(&outcome, ELECTRICITY_URI, TOTAL_CONSUMPTION);
    let expected = common::round_trip_consumption_kwh();
    assert!(
        (kwh - expected).abs() < 1e-6,
        "consumption {kwh} kWh, expected {expected} kWh"
    );
}

#[test]
fn heater_warms_then_returns_toward_outside() {
    let setup = common::scripted_setup(common::round_trip_timeline());
    let (outcome, _) = common::run(UNIT_TEST, &setup, 1.0);
    let mean = common::value(&outcome, TEMPERATURE_URI, MEAN_TEMPERATURE);
    assert!(mean > 19.0 && mean < 300.0, "mean temperature {mean}");

    let last = common::value(&outcome, TEMPERATURE_URI, "final temperature");
    let peak = outcome
        .trace
        .iter()
        .filter(|r| r.model == TEMPERATURE_URI)
        .map(|r| r.value)
        .fold(f64::MIN, f64::max);
    assert!(peak > last, "peak {peak} should exceed final {last}");
    assert!(last > 19.0);
}

#[test]
fn final_state_is_off_and_owner_sees_no_power() {
    let setup = common::scripted_setup(common::round_trip_timeline());
    let (outcome, owner) = common::run(UNIT_TEST, &setup, 1.0);
    let state = common::report(&outcome, STATE_URI).text_of(FINAL_STATE);
    assert_eq!(state, Some("OFF"));
    assert_eq!(owner.get(OWNER_POWER_FIELD), Some(0.0));
    assert_eq!(
        common::report(&outcome, TESTER_URI).value_of("events emitted"),
        Some(4.0)
    );
}

#[test]
fn owner_sees_power_while_heating() {
    let setup = common::scripted_setup(common::round_trip_timeline());
    let (mut simulator, owner) = common::simulator(UNIT_TEST, &setup);
    assert!(simulator.initialise(SimTime::ZERO).is_ok());

    assert!(simulator.run_until(SimTime::from_minutes(12.0)).is_ok());
    assert!(
        owner
            .get(OWNER_POWER_FIELD)
            .is_some_and(|w| (w - 2000.0).abs() < 1e-9)
    );
    let current = simulator
        .variable(&VariableId::new(ELECTRICITY_URI, "currentIntensity"))
        .map(|v| v.value())
        .unwrap_or_else(|e| panic!("{e}"));
    assert!((current - 2000.0 / 220.0).abs() < 1e-12);

    assert!(simulator.run_until(SimTime::from_minutes(15.0)).is_ok());
    assert!(
        owner
            .get(OWNER_POWER_FIELD)
            .is_some_and(|w| (w - common::REDUCED_POWER_W).abs() < 1e-9)
    );

    let reports = simulator
        .end_simulation(SimTime::from_hours(1.0))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(reports.len(), 5);
    assert!(
        simulator
            .final_report(&ModelUri::from(ELECTRICITY_URI))
            .is_some()
    );
}

#[test]
fn trace_is_time_ordered() {
    let setup = common::scripted_setup(common::round_trip_timeline());
    let (outcome, _) = common::run(UNIT_TEST, &setup, 1.0);
    assert!(!outcome.trace.is_empty());
    assert!(outcome.trace.windows(2).all(|w| w[0].time_h <= w[1].time_h));
}
