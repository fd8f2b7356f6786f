//! The local simulator: instantiates a flattened architecture, initialises
//! its variables, and pumps events in simulated-time order.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{ArchitectureError, SimError};

use super::architecture::{Architecture, EventEndpoint};
use super::event::{Event, EventKind};
use super::fixpoint::{self, PassResult};
use super::model::{AtomicModel, ModelContext};
use super::report::FinalReport;
use super::time::SimTime;
use super::types::{ModelUri, RunParameters, VariableId};
use super::variable::{ContinuousVariable, TraceRecord, VariableStore};

/// Upper bound on activation rounds at a single simulated instant.
const MAX_MICROSTEPS: usize = 10_000;

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub reports: Vec<FinalReport>,
    pub trace: Vec<TraceRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Constructed,
    Initialised,
    Ended,
}

/// Sequential simulator over the atomic models of one architecture.
///
/// Built with [`Simulator::construct`], then driven through
/// [`initialise`](Self::initialise), [`run_until`](Self::run_until) and
/// [`end_simulation`](Self::end_simulation). Any error poisons the
/// simulator: later calls return [`SimError::RunAborted`] so a corrupted
/// run never yields a final report.
pub struct Simulator {
    uri: ModelUri,
    models: Vec<AtomicModel>,
    index: HashMap<ModelUri, usize>,
    routes: HashMap<EventEndpoint, Vec<EventEndpoint>>,
    store: VariableStore,
    params: RunParameters,
    now: SimTime,
    phase: Phase,
    poisoned: Option<String>,
    reports: Vec<FinalReport>,
}

impl Simulator {
    /// Instantiates every atomic model of `architecture` and wires its
    /// routes and variable bindings.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Architecture`] when flattening fails.
    pub fn construct(architecture: &Architecture) -> Result<Self, SimError> {
        let flat = architecture.flatten()?;

        let mut store = VariableStore::new();
        let mut models = Vec::with_capacity(flat.models.len());
        let mut index = HashMap::with_capacity(flat.models.len());
        for descriptor in &flat.models {
            for name in &descriptor.interface.exports {
                store.declare(VariableId::of(&descriptor.uri, name));
            }
            index.insert(descriptor.uri.clone(), models.len());
            models.push(descriptor.instantiate());
        }
        for (export, import) in flat.bindings {
            store.bind(export, import);
        }

        info!(
            architecture = %architecture.uri(),
            models = models.len(),
            "simulator constructed"
        );
        Ok(Self {
            uri: architecture.uri().clone(),
            models,
            index,
            routes: flat.routes,
            store,
            params: RunParameters::default(),
            now: SimTime::ZERO,
            phase: Phase::Constructed,
            poisoned: None,
            reports: Vec::new(),
        })
    }

    pub fn uri(&self) -> &ModelUri {
        &self.uri
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Installs per-run parameters; call before [`initialise`](Self::initialise).
    pub fn set_run_parameters(&mut self, params: RunParameters) {
        self.store.set_record_trace(params.record_trace);
        self.params = params;
    }

    /// Resets every model for a run starting at `start`, then resolves the
    /// initial values of all exported variables.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::FixpointDeadlock`] on circular dependencies, or
    /// any error a model raises while initialising.
    pub fn initialise(&mut self, start: SimTime) -> Result<(), SimError> {
        self.guard()?;
        let result = self.initialise_inner(start);
        self.settle(result)
    }

    fn initialise_inner(&mut self, start: SimTime) -> Result<(), SimError> {
        self.now = start;
        self.reports.clear();
        for model in &mut self.models {
            model.initialise_state(start);
        }

        let Self {
            models,
            store,
            params,
            ..
        } = self;
        let passes = fixpoint::resolve(|_| {
            let mut pass = PassResult::default();
            for model in models.iter_mut() {
                let uri = model.uri().clone();
                let mut ctx =
                    ModelContext::new(&uri, &mut *store, params.owner.as_ref(), start);
                let status = model.initialise_variables(&mut ctx)?;
                pass.record(status.initialised, status.blocked);
            }
            Ok(pass)
        })?;

        let leftover: Vec<String> = self.store.uninitialised().map(ToString::to_string).collect();
        if !leftover.is_empty() {
            warn!(variables = ?leftover, "exported variables left uninitialised");
        }

        self.phase = Phase::Initialised;
        info!(simulator = %self.uri, %start, passes, "simulation initialised");
        Ok(())
    }

    /// Queues an externally triggered event for the model `target`.
    ///
    /// # Errors
    ///
    /// Returns an [`ArchitectureError::DanglingEndpoint`] for an unknown
    /// target and a precondition violation for an event in the past.
    pub fn schedule_external(&mut self, target: &ModelUri, event: Event) -> Result<(), SimError> {
        self.guard()?;
        let Some(&idx) = self.index.get(target) else {
            return Err(ArchitectureError::DanglingEndpoint {
                architecture: self.uri.to_string(),
                role: "external target",
                endpoint: target.to_string(),
            }
            .into());
        };
        if event.time() < self.now {
            return Err(SimError::precondition(
                target,
                format!(
                    "event {} at {} precedes current time {}",
                    event.event_type(),
                    event.time(),
                    self.now
                ),
            ));
        }
        debug!(
            target = %target,
            event = %event.event_type(),
            time = %event.time(),
            "external event scheduled"
        );
        self.models[idx].deliver(event);
        Ok(())
    }

    /// Shorthand for scheduling `kind` at `time` on `target`.
    ///
    /// # Errors
    ///
    /// See [`schedule_external`](Self::schedule_external).
    pub fn inject_at(
        &mut self,
        target: &ModelUri,
        time: SimTime,
        kind: EventKind,
    ) -> Result<(), SimError> {
        self.schedule_external(target, Event::new(time, kind))
    }

    /// Time of the earliest pending activation of any model.
    pub fn next_event_time(&self) -> SimTime {
        self.models
            .iter()
            .map(AtomicModel::next_activation)
            .min()
            .unwrap_or(SimTime::INFINITY)
    }

    /// Executes every activation due at or before `end`, in time order,
    /// and leaves the clock at `end`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a model; the simulator is then
    /// poisoned.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), SimError> {
        self.guard()?;
        if self.phase != Phase::Initialised {
            return Err(SimError::RunAborted(format!(
                "simulator {} is not initialised",
                self.uri
            )));
        }
        let result = self.run_until_inner(end);
        self.settle(result)
    }

    fn run_until_inner(&mut self, end: SimTime) -> Result<(), SimError> {
        loop {
            let t = self.next_event_time();
            if !t.is_finite() || t > end {
                break;
            }
            self.step(t)?;
        }
        if end > self.now {
            self.now = end;
        }
        Ok(())
    }

    /// Runs every activation round due at the instant `t`.
    fn step(&mut self, t: SimTime) -> Result<(), SimError> {
        self.now = t;
        for round in 0.. {
            let imminent: Vec<bool> = self.models.iter().map(|m| m.is_imminent(t)).collect();
            if !imminent.iter().any(|&i| i) && !self.models.iter().any(|m| m.has_due_input(t)) {
                break;
            }
            if round >= MAX_MICROSTEPS {
                return Err(SimError::RunAborted(format!(
                    "no quiescence after {MAX_MICROSTEPS} rounds at {t}"
                )));
            }

            for idx in (0..self.models.len()).filter(|&i| imminent[i]) {
                for event in self.models[idx].output() {
                    self.route(idx, event)?;
                }
            }

            for (idx, model) in self.models.iter_mut().enumerate() {
                let external = model.has_due_input(t);
                if !imminent[idx] && !external {
                    continue;
                }
                let uri = model.uri().clone();
                let mut ctx = ModelContext::new(&uri, &mut self.store, self.params.owner.as_ref(), t);
                if imminent[idx] {
                    model.internal_transition(&mut ctx)?;
                }
                if external {
                    model.external_transition(&mut ctx)?;
                }
            }
        }
        Ok(())
    }

    fn route(&mut self, source: usize, event: Event) -> Result<(), SimError> {
        let key = EventEndpoint {
            member: self.models[source].uri().clone(),
            event_type: event.event_type(),
        };
        let Some(sinks) = self.routes.get(&key) else {
            debug!(source = %key.member, event = %key.event_type, "event has no sink");
            return Ok(());
        };
        for sink in sinks {
            let delivered = event
                .retagged(sink.event_type)
                .ok_or_else(|| ArchitectureError::IncompatibleRoute {
                    architecture: self.uri.to_string(),
                    from: event.event_type(),
                    to: sink.event_type,
                })?;
            if let Some(&idx) = self.index.get(&sink.member) {
                debug!(
                    from = %key.member,
                    to = %sink.member,
                    event = %sink.event_type,
                    time = %event.time(),
                    "event routed"
                );
                self.models[idx].deliver(delivered);
            }
        }
        Ok(())
    }

    /// Runs the remaining activations up to `end`, flushes every model's
    /// accumulators and freezes the final reports.
    ///
    /// # Errors
    ///
    /// Returns any error raised while finishing the run.
    pub fn end_simulation(&mut self, end: SimTime) -> Result<&[FinalReport], SimError> {
        self.run_until(end)?;
        let result = self.end_inner(end);
        self.settle(result)?;
        Ok(&self.reports)
    }

    fn end_inner(&mut self, end: SimTime) -> Result<(), SimError> {
        let mut reports = Vec::with_capacity(self.models.len());
        for model in &mut self.models {
            let uri = model.uri().clone();
            let mut ctx = ModelContext::new(&uri, &mut self.store, self.params.owner.as_ref(), end);
            model.end_simulation(end, &mut ctx)?;
            reports.push(model.final_report());
        }
        self.reports = reports;
        self.phase = Phase::Ended;
        info!(simulator = %self.uri, %end, "simulation ended");
        Ok(())
    }

    /// Initialises at `start`, runs for `duration_h` hours as fast as
    /// possible and returns the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first error of any phase.
    pub fn run_detached(&mut self, start: SimTime, duration_h: f64) -> Result<RunOutcome, SimError> {
        self.initialise(start)?;
        self.end_simulation(start + duration_h)?;
        Ok(self.outcome())
    }

    /// Final reports of the last ended run, in model instantiation order.
    pub fn final_reports(&self) -> &[FinalReport] {
        &self.reports
    }

    /// Final report of the model `uri`, once the run has ended.
    pub fn final_report(&self, uri: &ModelUri) -> Option<&FinalReport> {
        self.reports.iter().find(|r| &r.model == uri)
    }

    /// Reports and the recorded trace, moving the trace out of the store.
    pub fn outcome(&mut self) -> RunOutcome {
        RunOutcome {
            reports: self.reports.clone(),
            trace: self.store.take_trace(),
        }
    }

    /// Reads an exported variable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::VariableError::Unknown`] for undeclared variables.
    pub fn variable(&self, id: &VariableId) -> Result<&ContinuousVariable, SimError> {
        Ok(self.store.exported(id)?)
    }

    pub fn trace(&self) -> &[TraceRecord] {
        self.store.trace()
    }

    fn guard(&self) -> Result<(), SimError> {
        match (&self.poisoned, self.phase) {
            (Some(reason), _) => Err(SimError::RunAborted(format!(
                "simulator {} poisoned by an earlier failure: {reason}",
                self.uri
            ))),
            (None, Phase::Ended) => Err(SimError::RunAborted(format!(
                "simulator {} has already ended",
                self.uri
            ))),
            _ => Ok(()),
        }
    }

    fn settle<T>(&mut self, result: Result<T, SimError>) -> Result<T, SimError> {
        if let Err(err) = &result {
            error!(simulator = %self.uri, error = %err, "simulation failed");
            self.poisoned = Some(err.to_string());
        }
        result
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("uri", &self.uri)
            .field("models", &self.models.len())
            .field("now", &self.now)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::event::EventType;
    use crate::sim::model::{Behaviour, InitStatus, ModelDescriptor, ModelInterface};
    use crate::sim::report::FinalReport;

    /// Echoes every received event once, like a discrete relay.
    #[derive(Default)]
    struct Relay {
        outbox: Vec<Event>,
        seen: Vec<EventType>,
    }

    impl Behaviour for Relay {
        fn initialise_state(&mut self, _start: SimTime) {
            self.outbox.clear();
            self.seen.clear();
        }

        fn time_advance(&self) -> f64 {
            if self.outbox.is_empty() { f64::INFINITY } else { 0.0 }
        }

        fn output(&mut self) -> Vec<Event> {
            std::mem::take(&mut self.outbox)
        }

        fn internal_transition(&mut self, _: f64, _: &mut ModelContext<'_>) -> Result<(), SimError> {
            Ok(())
        }

        fn external_transition(
            &mut self,
            _: f64,
            event: Event,
            _: &mut ModelContext<'_>,
        ) -> Result<(), SimError> {
            self.seen.push(event.event_type());
            self.outbox.push(event);
            Ok(())
        }

        fn end_simulation(&mut self, _: SimTime, _: &mut ModelContext<'_>) -> Result<(), SimError> {
            Ok(())
        }

        fn final_report(&self, uri: &ModelUri) -> FinalReport {
            let seen: Vec<&str> = self.seen.iter().map(|t| t.name()).collect();
            FinalReport::new(uri.clone()).text("seen", seen.join(","))
        }
    }

    /// Exports `x`, optionally waiting on import `y`.
    struct Source {
        waits: bool,
    }

    impl Behaviour for Source {
        fn initialise_state(&mut self, _start: SimTime) {}

        fn initialise_variables(&mut self, ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
            if ctx.exported("x")?.is_initialised() {
                return Ok(InitStatus::done());
            }
            let ready = ctx.import("y").is_ok_and(ContinuousVariable::is_initialised);
            if self.waits && !ready {
                return Ok(InitStatus::blocked(vec![VariableId::of(ctx.uri(), "x")]));
            }
            ctx.initialise_export("x", 1.0, None)?;
            Ok(InitStatus::initialised(1))
        }

        fn time_advance(&self) -> f64 {
            f64::INFINITY
        }

        fn internal_transition(&mut self, _: f64, _: &mut ModelContext<'_>) -> Result<(), SimError> {
            Ok(())
        }

        fn external_transition(&mut self, _: f64, _: Event, _: &mut ModelContext<'_>) -> Result<(), SimError> {
            Ok(())
        }

        fn end_simulation(&mut self, _: SimTime, _: &mut ModelContext<'_>) -> Result<(), SimError> {
            Ok(())
        }

        fn final_report(&self, uri: &ModelUri) -> FinalReport {
            FinalReport::new(uri.clone())
        }
    }

    fn relay(uri: &str) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new()
                .emitting(&EventType::ALL)
                .accepting(&EventType::ALL),
            || Box::new(Relay::default()),
        )
    }

    fn source(uri: &str, waits: bool) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new().exporting("x").importing("y"),
            move || Box::new(Source { waits }),
        )
    }

    fn chain() -> Architecture {
        Architecture::builder("chain")
            .model(relay("a"))
            .model(relay("b"))
            .route_types("a", &["b"], &EventType::ALL)
            .build()
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn events_are_relayed_in_priority_order() {
        let mut sim = Simulator::construct(&chain()).unwrap_or_else(|e| panic!("{e}"));
        sim.initialise(SimTime::ZERO).unwrap_or_else(|e| panic!("{e}"));
        let a = ModelUri::from("a");
        let t = SimTime::from_minutes(5.0);
        sim.inject_at(&a, t, EventKind::SwitchOff).unwrap_or_else(|e| panic!("{e}"));
        sim.inject_at(&a, t, EventKind::SetPower { power_w: 10.0 })
            .unwrap_or_else(|e| panic!("{e}"));
        sim.inject_at(&a, t, EventKind::SwitchOn).unwrap_or_else(|e| panic!("{e}"));

        let reports = sim
            .end_simulation(SimTime::from_hours(1.0))
            .unwrap_or_else(|e| panic!("{e}"));
        let b = reports
            .iter()
            .find(|r| r.model.as_str() == "b")
            .and_then(|r| r.text_of("seen"));
        assert_eq!(b, Some("switch_on,set_power,switch_off"));
    }

    #[test]
    fn unknown_target_is_a_configuration_error() {
        let mut sim = Simulator::construct(&chain()).unwrap_or_else(|e| panic!("{e}"));
        sim.initialise(SimTime::ZERO).unwrap_or_else(|e| panic!("{e}"));
        let err = sim.inject_at(&ModelUri::from("ghost"), SimTime::ZERO, EventKind::Heat);
        assert!(matches!(
            err,
            Err(SimError::Architecture(ArchitectureError::DanglingEndpoint { .. }))
        ));
    }

    #[test]
    fn past_events_are_rejected() {
        let mut sim = Simulator::construct(&chain()).unwrap_or_else(|e| panic!("{e}"));
        sim.initialise(SimTime::ZERO).unwrap_or_else(|e| panic!("{e}"));
        sim.run_until(SimTime::from_hours(1.0)).unwrap_or_else(|e| panic!("{e}"));
        let err = sim.inject_at(&ModelUri::from("a"), SimTime::ZERO, EventKind::Heat);
        assert!(matches!(err, Err(SimError::Precondition { .. })));
    }

    #[test]
    fn dependent_variables_resolve_through_bindings() {
        let arch = Architecture::builder("vars")
            .model(source("late", true))
            .model(source("early", false))
            .bind(VariableId::new("early", "x"), vec![VariableId::new("late", "y")])
            .build()
            .unwrap_or_else(|e| panic!("{e}"));
        let mut sim = Simulator::construct(&arch).unwrap_or_else(|e| panic!("{e}"));
        assert!(sim.initialise(SimTime::ZERO).is_ok());
        let late = sim.variable(&VariableId::new("late", "x"));
        assert!(late.is_ok_and(ContinuousVariable::is_initialised));
    }

    #[test]
    fn cyclic_variables_deadlock_and_poison() {
        let arch = Architecture::builder("cycle")
            .model(source("p", true))
            .model(source("q", true))
            .bind(VariableId::new("p", "x"), vec![VariableId::new("q", "y")])
            .bind(VariableId::new("q", "x"), vec![VariableId::new("p", "y")])
            .build()
            .unwrap_or_else(|e| panic!("{e}"));
        let mut sim = Simulator::construct(&arch).unwrap_or_else(|e| panic!("{e}"));
        let err = sim.initialise(SimTime::ZERO);
        assert!(matches!(err, Err(SimError::FixpointDeadlock { ref blocked }) if blocked.len() == 2));
        assert!(matches!(
            sim.run_until(SimTime::from_hours(1.0)),
            Err(SimError::RunAborted(_))
        ));
    }

    #[test]
    fn ended_simulator_refuses_more_work() {
        let mut sim = Simulator::construct(&chain()).unwrap_or_else(|e| panic!("{e}"));
        assert!(sim.run_detached(SimTime::ZERO, 1.0).is_ok());
        assert_eq!(sim.final_reports().len(), 2);
        assert!(sim.final_report(&ModelUri::from("a")).is_some());
        assert!(matches!(
            sim.run_until(SimTime::from_hours(2.0)),
            Err(SimError::RunAborted(_))
        ));
    }
}
