//! Simultaneous heater events are applied in priority order.

mod common;

use appliance_sil::devices::architectures::{INTEGRATION, UNIT_TEST};
use appliance_sil::devices::heater::{
    CURRENT_INTENSITY, ELECTRICITY_URI, STATE_URI, TimelineEntry,
};
use appliance_sil::sim::event::EventKind;
use appliance_sil::sim::report::{FINAL_STATE, TOTAL_CONSUMPTION};
use appliance_sil::sim::time::SimTime;
use appliance_sil::sim::types::VariableId;

fn switch_off_with_power_change() -> Vec<TimelineEntry> {
    let at = SimTime::from_minutes(10.0);
    vec![
        TimelineEntry::new(SimTime::from_minutes(1.0), EventKind::SwitchOn),
        TimelineEntry::new(SimTime::from_minutes(2.0), EventKind::Heat),
        // scripted before the power change, applied after it
        TimelineEntry::new(at, EventKind::SwitchOff),
        TimelineEntry::new(at, EventKind::SetPower { power_w: 500.0 }),
    ]
}

#[test]
fn switch_off_wins_over_simultaneous_set_power() {
    for id in [UNIT_TEST, INTEGRATION] {
        let setup = common::scripted_setup(switch_off_with_power_change());
        let (mut simulator, _) = common::simulator(id, &setup);
        assert!(simulator.initialise(SimTime::ZERO).is_ok());
        let end = SimTime::from_minutes(30.0);
        if let Err(e) = simulator.end_simulation(end) {
            panic!("{id}: {e}");
        }

        let current = simulator
            .variable(&VariableId::new(ELECTRICITY_URI, CURRENT_INTENSITY))
            .map(|v| v.value())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(current, 0.0, "{id}");

        let outcome = simulator.outcome();
        assert_eq!(
            common::report(&outcome, STATE_URI).text_of(FINAL_STATE),
            Some("OFF"),
            "{id}"
        );
        // idle for one minute, full power for eight
        let expected = (22.0 / 60.0 + 2000.0 * 8.0 / 60.0) / 1000.0;
        let kwh = common::value(&outcome, ELECTRICITY_URI, TOTAL_CONSUMPTION);
        assert!((kwh - expected).abs() < 1e-9, "{id}: {kwh} vs {expected}");
    }
}

#[test]
fn switch_on_precedes_heat_at_the_same_instant() {
    let at = SimTime::from_minutes(3.0);
    let timeline = vec![
        TimelineEntry::new(at, EventKind::Heat),
        TimelineEntry::new(at, EventKind::SwitchOn),
    ];
    let setup = common::scripted_setup(timeline);
    let (outcome, owner) = common::run(UNIT_TEST, &setup, 0.25);
    assert_eq!(
        common::report(&outcome, STATE_URI).text_of(FINAL_STATE),
        Some("HEATING")
    );
    assert!(
        owner
            .get(appliance_sil::devices::heater::OWNER_POWER_FIELD)
            .is_some_and(|w| (w - 2000.0).abs() < 1e-9)
    );
}
