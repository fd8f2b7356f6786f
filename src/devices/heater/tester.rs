//! Scripted source of heater events for unit-test architectures.

use serde::Serialize;
use tracing::debug;

use crate::error::SimError;
use crate::sim::event::{Event, EventKind};
use crate::sim::model::{Behaviour, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::FinalReport;
use crate::sim::time::SimTime;
use crate::sim::types::ModelUri;

use super::HEATER_EVENTS;

/// One scripted controller action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub at: SimTime,
    pub kind: EventKind,
}

impl TimelineEntry {
    pub fn new(at: SimTime, kind: EventKind) -> Self {
        Self { at, kind }
    }
}

/// Emits a fixed timeline of heater events, then goes passive.
#[derive(Debug)]
pub struct HeaterUnitTester {
    timeline: Vec<TimelineEntry>,
    next: usize,
    clock: SimTime,
    emitted: usize,
}

impl HeaterUnitTester {
    /// Creates a tester; entries are sorted by time, keeping the given
    /// order among simultaneous ones.
    pub fn new(mut timeline: Vec<TimelineEntry>) -> Self {
        timeline.sort_by_key(|e| e.at);
        Self {
            timeline,
            next: 0,
            clock: SimTime::ZERO,
            emitted: 0,
        }
    }

    pub fn descriptor(uri: &str, timeline: Vec<TimelineEntry>) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new().emitting(&HEATER_EVENTS),
            move || Box::new(HeaterUnitTester::new(timeline.clone())),
        )
    }

    /// Entries sharing the time of the next pending one.
    fn due(&self) -> &[TimelineEntry] {
        let Some(first) = self.timeline.get(self.next) else {
            return &[];
        };
        let count = self.timeline[self.next..]
            .iter()
            .take_while(|e| e.at == first.at)
            .count();
        &self.timeline[self.next..self.next + count]
    }
}

impl Behaviour for HeaterUnitTester {
    fn initialise_state(&mut self, start: SimTime) {
        self.clock = start;
        self.emitted = 0;
        self.next = self.timeline.partition_point(|e| e.at < start);
    }

    fn time_advance(&self) -> f64 {
        match self.timeline.get(self.next) {
            Some(entry) => entry.at.since(self.clock).max(0.0),
            None => f64::INFINITY,
        }
    }

    fn output(&mut self) -> Vec<Event> {
        self.due()
            .iter()
            .map(|e| Event::new(e.at, e.kind))
            .collect()
    }

    fn internal_transition(
        &mut self,
        _elapsed_h: f64,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        let count = self.due().len();
        self.next += count;
        self.emitted += count;
        self.clock = ctx.now();
        debug!(model = %ctx.uri(), count, "scripted events emitted");
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

    fn end_simulation(&mut self, _end: SimTime, _ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        Ok(())
    }

    fn final_report(&self, uri: &ModelUri) -> FinalReport {
        FinalReport::new(uri.clone()).number("events emitted", self.emitted as f64, "events")
    }
}
