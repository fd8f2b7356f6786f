//! Meter electricity model: total current, consumption and power
//! debt/margin relative to the subscribed power.

use tracing::{debug, trace};

use crate::error::SimError;
use crate::sim::event::Event;
use crate::sim::model::{Behaviour, InitStatus, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::{FinalReport, LARGEST_POWER_DEBT, LARGEST_POWER_MARGIN, TOTAL_CONSUMPTION};
use crate::sim::time::SimTime;
use crate::sim::types::{ModelUri, VariableId};

use super::METER_CURRENT;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterParams {
    pub tension_v: f64,
    /// Subscribed power, in watts.
    pub available_power_w: f64,
    /// Sampling step, in hours.
    pub step_h: f64,
}

impl Default for MeterParams {
    fn default() -> Self {
        Self {
            tension_v: 220.0,
            available_power_w: 3000.0,
            step_h: 1.0 / 60.0,
        }
    }
}

/// Largest value seen so far, with the time it was first reached.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Peak {
    value: f64,
    at: Option<SimTime>,
}

impl Peak {
    fn observe(&mut self, value: f64, at: SimTime) {
        if value > self.value {
            self.value = value;
            self.at = Some(at);
        }
    }

    fn report(self, report: FinalReport, label: &str) -> FinalReport {
        match self.at {
            Some(at) => report.number_at(label, self.value, "W", at),
            None => report.number(label, self.value, "W"),
        }
    }
}

/// Samples the sum of its imported currents every step.
#[derive(Debug)]
pub struct ElectricMeter {
    params: MeterParams,
    imports: Vec<String>,
    current_a: f64,
    consumption_kwh: f64,
    last_accumulation: SimTime,
    debt: Peak,
    margin: Peak,
}

impl ElectricMeter {
    /// Creates a meter summing the currents imported under `imports`.
    pub fn new(params: MeterParams, imports: Vec<String>) -> Self {
        Self {
            params,
            imports,
            current_a: 0.0,
            consumption_kwh: 0.0,
            last_accumulation: SimTime::ZERO,
            debt: Peak::default(),
            margin: Peak::default(),
        }
    }

    pub fn descriptor(uri: &str, params: MeterParams, imports: &[&str]) -> ModelDescriptor {
        let names: Vec<String> = imports.iter().map(|s| s.to_string()).collect();
        let interface = names
            .iter()
            .fold(ModelInterface::new().exporting(METER_CURRENT), |i, n| {
                i.importing(n)
            });
        ModelDescriptor::new(uri, interface, move || {
            Box::new(ElectricMeter::new(params, names.clone()))
        })
    }

    pub fn consumption_kwh(&self) -> f64 {
        self.consumption_kwh
    }

    /// Sum of the bound imports at the context's time; unbound imports
    /// are never read.
    fn total_current(&self, ctx: &ModelContext<'_>) -> Result<f64, SimError> {
        let mut total = 0.0;
        for name in self.imports.iter().filter(|n| ctx.is_bound(n)) {
            total += ctx.import_now(name)?;
        }
        Ok(total)
    }

    fn observe(&mut self, now: SimTime) {
        let power_w = self.current_a * self.params.tension_v;
        self.debt.observe(power_w - self.params.available_power_w, now);
        self.margin.observe(self.params.available_power_w - power_w, now);
    }

    fn accumulate(&mut self, now: SimTime) {
        let elapsed = now.since(self.last_accumulation);
        self.consumption_kwh += elapsed * self.params.tension_v * self.current_a / 1000.0;
        self.last_accumulation = now;
    }
}

impl Behaviour for ElectricMeter {
    fn initialise_state(&mut self, start: SimTime) {
        self.current_a = 0.0;
        self.consumption_kwh = 0.0;
        self.last_accumulation = start;
        self.debt = Peak::default();
        self.margin = Peak::default();
    }

    fn initialise_variables(&mut self, ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
        if ctx.exported(METER_CURRENT)?.is_initialised() {
            return Ok(InitStatus::done());
        }
        for name in self.imports.iter().filter(|n| ctx.is_bound(n)) {
            if !ctx.import(name)?.is_initialised() {
                return Ok(InitStatus::blocked(vec![VariableId::of(
                    ctx.uri(),
                    METER_CURRENT,
                )]));
            }
        }
        self.current_a = self.total_current(ctx)?;
        self.observe(ctx.now());
        ctx.initialise_export(METER_CURRENT, self.current_a, None)?;
        Ok(InitStatus::initialised(1))
    }

    fn time_advance(&self) -> f64 {
        self.params.step_h
    }

    fn internal_transition(
        &mut self,
        _elapsed_h: f64,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        let now = ctx.now();
        self.accumulate(now);
        self.current_a = self.total_current(ctx)?;
        self.observe(now);
        trace!(model = %ctx.uri(), current_a = self.current_a, "meter sampled");
        ctx.update_export(METER_CURRENT, self.current_a, None)?;
        Ok(())
    }

    fn external_transition(
        &mut self,
        _elapsed_h: f64,
        event: Event,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        Err(SimError::precondition(
            ctx.uri(),
            format!("unexpected {} event", event.event_type()),
        ))
    }

    fn end_simulation(&mut self, end: SimTime, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        self.accumulate(end);
        debug!(model = %ctx.uri(), consumption_kwh = self.consumption_kwh, "meter closed");
        Ok(())
    }

    fn final_report(&self, uri: &ModelUri) -> FinalReport {
        let report =
            FinalReport::new(uri.clone()).number(TOTAL_CONSUMPTION, self.consumption_kwh, "kWh");
        let report = self.debt.report(report, LARGEST_POWER_DEBT);
        self.margin.report(report, LARGEST_POWER_MARGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::variable::VariableStore;

    const IMPORT: &str = "applianceCurrent";

    fn setup(current_a: f64) -> (ModelUri, VariableStore, ElectricMeter, VariableId) {
        let uri = ModelUri::from("meter");
        let source = VariableId::new("appliance", "current");
        let mut store = VariableStore::new();
        store.declare(VariableId::of(&uri, METER_CURRENT));
        store.declare(source.clone());
        store.bind(source.clone(), VariableId::of(&uri, IMPORT));
        assert!(store.initialise(&source, current_a, SimTime::ZERO, None).is_ok());
        let mut meter = ElectricMeter::new(MeterParams::default(), vec![IMPORT.to_string()]);
        meter.initialise_state(SimTime::ZERO);
        (uri, store, meter, source)
    }

    #[test]
    fn meter_integrates_and_tracks_margin() {
        let (uri, mut store, mut meter, _) = setup(10.0);
        let mut ctx = ModelContext::new(&uri, &mut store, None, SimTime::ZERO);
        assert_eq!(meter.initialise_variables(&mut ctx), Ok(InitStatus::initialised(1)));

        let end = SimTime::from_hours(1.0);
        let mut ctx = ModelContext::new(&uri, &mut store, None, end);
        assert!(meter.internal_transition(1.0, &mut ctx).is_ok());
        assert!(meter.end_simulation(end, &mut ctx).is_ok());
        // 10 A at 220 V for one hour
        assert!((meter.consumption_kwh() - 2.2).abs() < 1e-12);

        let report = meter.final_report(&uri);
        assert_eq!(report.value_of(LARGEST_POWER_MARGIN), Some(800.0));
        assert_eq!(report.time_of(LARGEST_POWER_MARGIN), Some(SimTime::ZERO));
        assert_eq!(report.value_of(LARGEST_POWER_DEBT), Some(0.0));
        assert_eq!(report.time_of(LARGEST_POWER_DEBT), None);
    }

    #[test]
    fn debt_is_recorded_with_its_time() {
        let (uri, mut store, mut meter, source) = setup(0.0);
        let mut ctx = ModelContext::new(&uri, &mut store, None, SimTime::ZERO);
        assert!(meter.initialise_variables(&mut ctx).is_ok());

        let t = SimTime::from_hours(0.5);
        assert!(store.update(&source, 15.0, t, None).is_ok());
        let mut ctx = ModelContext::new(&uri, &mut store, None, t);
        assert!(meter.internal_transition(0.5, &mut ctx).is_ok());

        let report = meter.final_report(&uri);
        assert_eq!(report.value_of(LARGEST_POWER_DEBT), Some(300.0));
        assert_eq!(report.time_of(LARGEST_POWER_DEBT), Some(t));
        assert_eq!(report.value_of(LARGEST_POWER_MARGIN), Some(3000.0));
    }

    #[test]
    fn waits_for_metered_currents() {
        let uri = ModelUri::from("meter");
        let source = VariableId::new("appliance", "current");
        let mut store = VariableStore::new();
        store.declare(VariableId::of(&uri, METER_CURRENT));
        store.declare(source.clone());
        store.bind(source, VariableId::of(&uri, IMPORT));
        let mut meter = ElectricMeter::new(MeterParams::default(), vec![IMPORT.to_string()]);
        meter.initialise_state(SimTime::ZERO);
        let mut ctx = ModelContext::new(&uri, &mut store, None, SimTime::ZERO);
        let status = meter.initialise_variables(&mut ctx);
        assert!(matches!(status, Ok(s) if s.blocked.len() == 1));
    }
}
