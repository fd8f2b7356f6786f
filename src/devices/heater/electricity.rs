//! Electric side of the heater: drawn current and consumed energy.

use tracing::{debug, trace};

use crate::error::SimError;
use crate::sim::event::{Event, EventKind};
use crate::sim::model::{Behaviour, InitStatus, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::{FinalReport, TOTAL_CONSUMPTION};
use crate::sim::time::SimTime;
use crate::sim::types::ModelUri;

use super::{CURRENT_INTENSITY, HEATER_EVENTS, HeaterParams, HeaterState, OWNER_POWER_FIELD};

/// Tracks the heater's current draw and integrates its consumption.
///
/// Consumption is a left Riemann sum: at every event and at the end of
/// the run, the interval since the previous accumulation is charged at
/// the current held *before* the event is applied. The new current is
/// only computed by the immediate internal transition that follows.
#[derive(Debug)]
pub struct HeaterElectricity {
    params: HeaterParams,
    state: HeaterState,
    power_w: f64,
    current_a: f64,
    consumption_kwh: f64,
    last_accumulation: SimTime,
    recompute: bool,
}

impl HeaterElectricity {
    pub fn new(params: HeaterParams) -> Self {
        Self {
            params,
            state: HeaterState::Off,
            power_w: params.max_power_w,
            current_a: 0.0,
            consumption_kwh: 0.0,
            last_accumulation: SimTime::ZERO,
            recompute: false,
        }
    }

    pub fn descriptor(uri: &str, params: HeaterParams) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new()
                .accepting(&HEATER_EVENTS)
                .exporting(CURRENT_INTENSITY),
            move || Box::new(HeaterElectricity::new(params)),
        )
    }

    pub fn consumption_kwh(&self) -> f64 {
        self.consumption_kwh
    }

    pub fn current_a(&self) -> f64 {
        self.current_a
    }

    fn accumulate(&mut self, now: SimTime, uri: &ModelUri) -> Result<(), SimError> {
        let elapsed = now.since(self.last_accumulation);
        let delta = elapsed * self.params.tension_v * self.current_a / 1000.0;
        self.consumption_kwh += delta;
        self.last_accumulation = now;
        trace!(model = %uri, elapsed_h = elapsed, delta_kwh = delta, "consumption accumulated");
        if self.consumption_kwh < 0.0 {
            return Err(SimError::precondition(
                uri,
                format!("negative consumption {} kWh", self.consumption_kwh),
            ));
        }
        Ok(())
    }
}

impl Behaviour for HeaterElectricity {
    fn initialise_state(&mut self, start: SimTime) {
        self.state = HeaterState::Off;
        self.power_w = self.params.max_power_w;
        self.current_a = 0.0;
        self.consumption_kwh = 0.0;
        self.last_accumulation = start;
        self.recompute = false;
    }

    fn initialise_variables(&mut self, ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
        if ctx.exported(CURRENT_INTENSITY)?.is_initialised() {
            return Ok(InitStatus::done());
        }
        ctx.initialise_export(CURRENT_INTENSITY, self.current_a, None)?;
        Ok(InitStatus::initialised(1))
    }

    fn time_advance(&self) -> f64 {
        if self.recompute { 0.0 } else { f64::INFINITY }
    }

    fn internal_transition(
        &mut self,
        _elapsed_h: f64,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        if !self.recompute {
            return Ok(());
        }
        self.recompute = false;
        self.current_a = self.params.current_a(self.state, self.power_w);
        ctx.update_export(CURRENT_INTENSITY, self.current_a, None)?;
        ctx.publish_to_owner(OWNER_POWER_FIELD, self.current_a * self.params.tension_v);
        debug!(model = %ctx.uri(), current_a = self.current_a, state = %self.state, "current updated");
        Ok(())
    }

    fn external_transition(
        &mut self,
        _elapsed_h: f64,
        event: Event,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        self.accumulate(ctx.now(), ctx.uri())?;

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
        self.recompute = true;
        Ok(())
    }

    fn end_simulation(&mut self, end: SimTime, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        self.accumulate(end, ctx.uri())
    }

    fn final_report(&self, uri: &ModelUri) -> FinalReport {
        FinalReport::new(uri.clone()).number(TOTAL_CONSUMPTION, self.consumption_kwh, "kWh")
    }
}
