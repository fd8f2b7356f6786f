//! Discrete relay holding the heater's OFF / ON / HEATING state.
//!
//! Every received event is stored and re-emitted unchanged on the next
//! activation, so the physical models downstream see exactly the events
//! the controller sent without being connected to it.

use tracing::debug;

use crate::error::SimError;
use crate::sim::event::Event;
use crate::sim::model::{Behaviour, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::{FINAL_STATE, FinalReport};
use crate::sim::time::SimTime;
use crate::sim::types::ModelUri;

use super::{HEATER_EVENTS, HeaterState};

#[derive(Debug, Default)]
pub struct HeaterStateModel {
    state: HeaterState,
    outbox: Vec<Event>,
}

impl HeaterStateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HeaterState {
        self.state
    }

    /// Descriptor of a state model accepting and re-emitting every heater event.
    pub fn descriptor(uri: &str) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new()
                .accepting(&HEATER_EVENTS)
                .emitting(&HEATER_EVENTS),
            || Box::new(HeaterStateModel::new()),
        )
    }
}

impl Behaviour for HeaterStateModel {
    fn initialise_state(&mut self, _start: SimTime) {
        self.state = HeaterState::Off;
        self.outbox.clear();
    }

    fn time_advance(&self) -> f64 {
        if self.outbox.is_empty() { f64::INFINITY } else { 0.0 }
    }

    fn output(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn internal_transition(
        &mut self,
        _elapsed_h: f64,
        _ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        Ok(())
    }

    fn external_transition(
        &mut self,
        _elapsed_h: f64,
        event: Event,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        if let Some(next) = self.state.after(event.event_type()) {
            debug!(model = %ctx.uri(), from = %self.state, to = %next, "heater state changed");
            self.state = next;
        }
        self.outbox.push(event);
        Ok(())
    }

    fn end_simulation(&mut self, _end: SimTime, _ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        Ok(())
    }

    fn final_report(&self, uri: &ModelUri) -> FinalReport {
        FinalReport::new(uri.clone()).text(FINAL_STATE, self.state.name())
    }
}
