//! Room temperature driven by insulation loss and, while heating, by heat
//! transfer from the heating plate.

use tracing::trace;

use crate::error::SimError;
use crate::sim::event::{Event, EventKind};
use crate::sim::model::{Behaviour, InitStatus, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::{FinalReport, MEAN_TEMPERATURE};
use crate::sim::time::SimTime;
use crate::sim::types::{ModelUri, VariableId};

use super::{CURRENT_TEMPERATURE, EXTERNAL_TEMPERATURE, HEATER_EVENTS, HeaterParams, HeaterState};

/// Integrates the room temperature with explicit Euler steps.
///
/// ```text
/// dT/dt = [(T_plate - T) / k(p) if HEATING] + (T_ext - T) / k_insulation
/// k(p)  = k_min * P_max / p
/// ```
#[derive(Debug)]
pub struct HeaterTemperature {
    params: HeaterParams,
    state: HeaterState,
    power_w: f64,
    temperature_c: f64,
    derivative: f64,
    last_update: SimTime,
    start: SimTime,
    weighted_sum: f64,
    covered_h: f64,
    mean_c: Option<f64>,
}

impl HeaterTemperature {
    pub fn new(params: HeaterParams) -> Self {
        Self {
            params,
            state: HeaterState::Off,
            power_w: params.max_power_w,
            temperature_c: params.initial_temperature_c,
            derivative: 0.0,
            last_update: SimTime::ZERO,
            start: SimTime::ZERO,
            weighted_sum: 0.0,
            covered_h: 0.0,
            mean_c: None,
        }
    }

    pub fn descriptor(uri: &str, params: HeaterParams) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new()
                .accepting(&HEATER_EVENTS)
                .exporting(CURRENT_TEMPERATURE)
                .importing(EXTERNAL_TEMPERATURE),
            move || Box::new(HeaterTemperature::new(params)),
        )
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    /// Time-weighted mean temperature since the start of the run.
    pub fn mean_temperature_c(&self) -> f64 {
        if self.covered_h > 0.0 {
            self.weighted_sum / self.covered_h
        } else {
            self.temperature_c
        }
    }

    fn compute_derivative(&self, external_c: f64) -> f64 {
        let heating = match self.state {
            HeaterState::Heating => {
                (self.params.plate_temperature_c - self.temperature_c)
                    / self.params.heat_transfer_constant(self.power_w)
            }
            HeaterState::Off | HeaterState::On => 0.0,
        };
        heating + (external_c - self.temperature_c) / self.params.insulation_transfer_constant
    }

    /// Brings the temperature up to the context's current time.
    fn advance(&mut self, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        let now = ctx.now();
        let elapsed = now.since(self.last_update);
        self.weighted_sum += self.temperature_c * elapsed;
        self.covered_h += elapsed;
        if elapsed > self.params.tolerance_h {
            self.temperature_c += self.derivative * elapsed;
        }
        self.last_update = now;
        self.refresh(ctx)
    }

    /// Recomputes the derivative from the current state and publishes a sample.
    fn refresh(&mut self, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        let external_c = ctx.import_now(EXTERNAL_TEMPERATURE)?;
        self.derivative = self.compute_derivative(external_c);
        trace!(
            model = %ctx.uri(),
            temperature_c = self.temperature_c,
            derivative = self.derivative,
            "temperature updated"
        );
        ctx.update_export(CURRENT_TEMPERATURE, self.temperature_c, Some(self.derivative))?;
        Ok(())
    }
}

impl Behaviour for HeaterTemperature {
    fn initialise_state(&mut self, start: SimTime) {
        self.state = HeaterState::Off;
        self.power_w = self.params.max_power_w;
        self.temperature_c = self.params.initial_temperature_c;
        self.derivative = 0.0;
        self.last_update = start;
        self.start = start;
        self.weighted_sum = 0.0;
        self.covered_h = 0.0;
        self.mean_c = None;
    }

    fn initialise_variables(&mut self, ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
        if ctx.exported(CURRENT_TEMPERATURE)?.is_initialised() {
            return Ok(InitStatus::done());
        }
        if !ctx.import(EXTERNAL_TEMPERATURE)?.is_initialised() {
            return Ok(InitStatus::blocked(vec![VariableId::of(
                ctx.uri(),
                CURRENT_TEMPERATURE,
            )]));
        }
        let external_c = ctx.import_now(EXTERNAL_TEMPERATURE)?;
        self.derivative = self.compute_derivative(external_c);
        ctx.initialise_export(CURRENT_TEMPERATURE, self.temperature_c, Some(self.derivative))?;
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
        self.advance(ctx)
    }

    fn external_transition(
        &mut self,
        _elapsed_h: f64,
        event: Event,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        self.advance(ctx)?;
        match event.kind() {
            EventKind::SetPower { power_w } => {
                self.params
                    .check_power_change(self.state, power_w)
                    .map_err(|message| SimError::precondition(ctx.uri(), message))?;
                self.power_w = power_w;
            }
            kind => {
                if let Some(next) = self.state.after(kind.event_type()) {
                    self.state = next;
                }
            }
        }
        self.refresh(ctx)
    }

    fn end_simulation(&mut self, end: SimTime, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        if end > self.last_update {
            self.advance(ctx)?;
        }
        self.mean_c = Some(self.mean_temperature_c());
        Ok(())
    }

    fn final_report(&self, uri: &ModelUri) -> FinalReport {
        FinalReport::new(uri.clone())
            .number(
                MEAN_TEMPERATURE,
                self.mean_c.unwrap_or_else(|| self.mean_temperature_c()),
                "°C",
            )
            .number("final temperature", self.temperature_c, "°C")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::variable::VariableStore;

    const EXT: f64 = 10.0;

    struct Rig {
        uri: ModelUri,
        store: VariableStore,
        model: HeaterTemperature,
    }

    impl Rig {
        fn new(external_initialised: bool) -> Self {
            let uri = ModelUri::from("temp");
            let ext = VariableId::new("ext", EXTERNAL_TEMPERATURE);
            let mut store = VariableStore::new();
            store.declare(VariableId::of(&uri, CURRENT_TEMPERATURE));
            store.declare(ext.clone());
            store.bind(ext.clone(), VariableId::of(&uri, EXTERNAL_TEMPERATURE));
            if external_initialised {
                assert!(store.initialise(&ext, EXT, SimTime::ZERO, None).is_ok());
            }
            let mut model = HeaterTemperature::new(HeaterParams::default());
            model.initialise_state(SimTime::ZERO);
            Self { uri, store, model }
        }

        fn ctx(&mut self, t: SimTime) -> (&mut HeaterTemperature, ModelContext<'_>) {
            (
                &mut self.model,
                ModelContext::new(&self.uri, &mut self.store, None, t),
            )
        }
    }

    #[test]
    fn initialisation_waits_for_external_temperature() {
        let mut rig = Rig::new(false);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        let status = model.initialise_variables(&mut ctx);
        assert!(matches!(status, Ok(ref s) if s.initialised == 0 && s.blocked.len() == 1));
    }

    #[test]
    fn idle_room_cools_toward_outside() {
        let mut rig = Rig::new(true);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        assert_eq!(model.initialise_variables(&mut ctx), Ok(InitStatus::initialised(1)));
        // (10 - 19) / 12.5
        assert!((model.derivative + 0.72).abs() < 1e-12);

        let step = HeaterParams::default().step_h;
        let t = SimTime::from_hours(step);
        let (model, mut ctx) = rig.ctx(t);
        assert!(model.internal_transition(step, &mut ctx).is_ok());
        assert!((model.temperature_c() - (19.0 - 0.72 * step)).abs() < 1e-12);
    }

    #[test]
    fn heating_rate_depends_on_power() {
        let mut rig = Rig::new(true);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        assert!(model.initialise_variables(&mut ctx).is_ok());
        for kind in [EventKind::SwitchOn, EventKind::Heat] {
            let (model, mut ctx) = rig.ctx(SimTime::ZERO);
            assert!(model.external_transition(0.0, Event::new(SimTime::ZERO, kind), &mut ctx).is_ok());
        }
        let full = rig.model.derivative;
        // (300 - 19) / 40 + (10 - 19) / 12.5
        assert!((full - (281.0 / 40.0 - 0.72)).abs() < 1e-12);

        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        let half = Event::new(SimTime::ZERO, EventKind::SetPower { power_w: 1000.0 });
        assert!(model.external_transition(0.0, half, &mut ctx).is_ok());
        assert!((rig.model.derivative - (281.0 / 80.0 - 0.72)).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_power_is_refused_as_such() {
        let mut rig = Rig::new(true);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        assert!(model.initialise_variables(&mut ctx).is_ok());
        for kind in [EventKind::SwitchOn, EventKind::Heat] {
            let (model, mut ctx) = rig.ctx(SimTime::ZERO);
            assert!(model.external_transition(0.0, Event::new(SimTime::ZERO, kind), &mut ctx).is_ok());
        }
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        let too_high = Event::new(SimTime::ZERO, EventKind::SetPower { power_w: 2500.0 });
        let err = model.external_transition(0.0, too_high, &mut ctx);
        assert!(matches!(
            err,
            Err(SimError::Precondition { ref message, .. }) if message.contains("outside [0, 2000] W")
        ));
    }

    #[test]
    fn steps_below_tolerance_are_not_integrated() {
        let mut rig = Rig::new(true);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        assert!(model.initialise_variables(&mut ctx).is_ok());
        let t = SimTime::from_hours(1e-5);
        let (model, mut ctx) = rig.ctx(t);
        assert!(model.internal_transition(1e-5, &mut ctx).is_ok());
        assert_eq!(model.temperature_c(), 19.0);
    }

    #[test]
    fn mean_is_time_weighted() {
        let mut rig = Rig::new(true);
        let (model, mut ctx) = rig.ctx(SimTime::ZERO);
        assert!(model.initialise_variables(&mut ctx).is_ok());
        let end = SimTime::from_hours(0.5);
        let (model, mut ctx) = rig.ctx(end);
        assert!(model.end_simulation(end, &mut ctx).is_ok());
        // one Euler interval, left-sampled
        let report = rig.model.final_report(&rig.uri);
        assert_eq!(report.value_of(MEAN_TEMPERATURE), Some(19.0));
    }
}
