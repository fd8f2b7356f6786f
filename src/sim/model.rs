//! The atomic model record and the behaviour contract its variants implement.
//!
//! An [`AtomicModel`] is a generic record: identity, an inbox, the kernel's
//! activation bookkeeping, and a boxed [`Behaviour`] strategy that supplies
//! the discrete state, the continuous dynamics and the final report of one
//! model variant.

use std::fmt;
use std::sync::Arc;

use crate::error::{SimError, VariableError};

use super::event::{Event, EventType};
use super::mailbox::Mailbox;
use super::report::FinalReport;
use super::time::SimTime;
use super::types::{ModelUri, OwnerFields, VariableId};
use super::variable::{ContinuousVariable, VariableStore};

/// Result of one initialisation attempt on a model's exported variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitStatus {
    /// Variables initialised by this attempt.
    pub initialised: usize,
    /// Variables that could not be initialised yet.
    pub blocked: Vec<VariableId>,
}

impl InitStatus {
    /// Nothing left to initialise.
    pub fn done() -> Self {
        Self::default()
    }

    /// `count` variables initialised by this attempt.
    pub fn initialised(count: usize) -> Self {
        Self {
            initialised: count,
            blocked: Vec::new(),
        }
    }

    /// The listed variables are waiting on an import.
    pub fn blocked(blocked: Vec<VariableId>) -> Self {
        Self {
            initialised: 0,
            blocked,
        }
    }
}

/// Static interface of a model: the event types it emits and accepts and the
/// variables it exports and imports. Architectures are validated against it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInterface {
    pub emits: Vec<EventType>,
    pub accepts: Vec<EventType>,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
}

impl ModelInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitting(mut self, types: &[EventType]) -> Self {
        self.emits.extend_from_slice(types);
        self
    }

    pub fn accepting(mut self, types: &[EventType]) -> Self {
        self.accepts.extend_from_slice(types);
        self
    }

    pub fn exporting(mut self, name: &str) -> Self {
        self.exports.push(name.to_string());
        self
    }

    pub fn importing(mut self, name: &str) -> Self {
        self.imports.push(name.to_string());
        self
    }
}

/// Read/write access a model gets to the variable store during an activation.
pub struct ModelContext<'a> {
    uri: &'a ModelUri,
    store: &'a mut VariableStore,
    owner: Option<&'a OwnerFields>,
    now: SimTime,
}

impl<'a> ModelContext<'a> {
    pub fn new(
        uri: &'a ModelUri,
        store: &'a mut VariableStore,
        owner: Option<&'a OwnerFields>,
        now: SimTime,
    ) -> Self {
        Self {
            uri,
            store,
            owner,
            now,
        }
    }

    /// Identity of the activated model.
    pub fn uri(&self) -> &ModelUri {
        self.uri
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Reads an imported variable through its binding.
    pub fn import(&self, name: &str) -> Result<&ContinuousVariable, VariableError> {
        self.store.imported(&VariableId::of(self.uri, name))
    }

    /// Evaluates an imported variable at the current time.
    pub fn import_now(&self, name: &str) -> Result<f64, VariableError> {
        self.import(name)?.evaluate_at(self.now)
    }

    /// Returns `true` when the import `name` is bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.store.is_bound(&VariableId::of(self.uri, name))
    }

    /// Reads one of this model's exported variables.
    pub fn exported(&self, name: &str) -> Result<&ContinuousVariable, VariableError> {
        self.store.exported(&VariableId::of(self.uri, name))
    }

    /// Sets the first sample of an exported variable at the current time.
    pub fn initialise_export(
        &mut self,
        name: &str,
        value: f64,
        derivative: Option<f64>,
    ) -> Result<(), VariableError> {
        let id = VariableId::of(self.uri, name);
        self.store.initialise(&id, value, self.now, derivative)
    }

    /// Writes a new sample of an exported variable at the current time.
    pub fn update_export(
        &mut self,
        name: &str,
        value: f64,
        derivative: Option<f64>,
    ) -> Result<(), VariableError> {
        let id = VariableId::of(self.uri, name);
        self.store.update(&id, value, self.now, derivative)
    }

    /// Pushes a value into the owning component's observable field `key`.
    pub fn publish_to_owner(&self, key: &str, value: f64) {
        if let Some(owner) = self.owner {
            owner.publish(key, value);
        }
    }
}

/// Behaviour strategy of one atomic model variant.
///
/// Elapsed durations and time advances are expressed in hours;
/// `f64::INFINITY` means "no further internal activity".
pub trait Behaviour: Send {
    /// Resets the discrete state and every accumulator for a run starting at `start`.
    fn initialise_state(&mut self, start: SimTime);

    /// Attempts to initialise this model's exported variables.
    fn initialise_variables(&mut self, _ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
        Ok(InitStatus::done())
    }

    /// Hours until the next mandatory internal activation.
    fn time_advance(&self) -> f64;

    /// Events to propagate, called just before an internal transition.
    fn output(&mut self) -> Vec<Event> {
        Vec::new()
    }

    /// Reaction to the passage of time.
    fn internal_transition(
        &mut self,
        elapsed_h: f64,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError>;

    /// Reaction to exactly one incoming event.
    fn external_transition(
        &mut self,
        elapsed_h: f64,
        event: Event,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError>;

    /// Flushes partial accumulations up to `end` and freezes the report.
    fn end_simulation(&mut self, end: SimTime, ctx: &mut ModelContext<'_>) -> Result<(), SimError>;

    /// The frozen final report.
    fn final_report(&self, uri: &ModelUri) -> FinalReport;
}

/// Builds a fresh behaviour for a model instance.
pub type BehaviourFactory = Arc<dyn Fn() -> Box<dyn Behaviour> + Send + Sync>;

/// Declaration of an atomic model inside an architecture.
#[derive(Clone)]
pub struct ModelDescriptor {
    pub uri: ModelUri,
    pub interface: ModelInterface,
    factory: BehaviourFactory,
}

impl ModelDescriptor {
    pub fn new<F>(uri: impl Into<String>, interface: ModelInterface, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Behaviour> + Send + Sync + 'static,
    {
        Self {
            uri: ModelUri::new(uri),
            interface,
            factory: Arc::new(factory),
        }
    }

    /// Creates a model instance.
    pub fn instantiate(&self) -> AtomicModel {
        AtomicModel::new(self.uri.clone(), (self.factory)())
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("uri", &self.uri)
            .field("interface", &self.interface)
            .finish_non_exhaustive()
    }
}

/// A model instance with its inbox and activation bookkeeping.
pub struct AtomicModel {
    uri: ModelUri,
    behaviour: Box<dyn Behaviour>,
    inbox: Mailbox,
    last_transition: SimTime,
    next_internal: SimTime,
}

impl AtomicModel {
    pub fn new(uri: ModelUri, behaviour: Box<dyn Behaviour>) -> Self {
        Self {
            uri,
            behaviour,
            inbox: Mailbox::new(),
            last_transition: SimTime::ZERO,
            next_internal: SimTime::INFINITY,
        }
    }

    pub fn uri(&self) -> &ModelUri {
        &self.uri
    }

    /// Resets state and schedules the first internal activation.
    pub fn initialise_state(&mut self, start: SimTime) {
        self.behaviour.initialise_state(start);
        self.inbox = Mailbox::new();
        self.reschedule(start);
    }

    pub fn initialise_variables(
        &mut self,
        ctx: &mut ModelContext<'_>,
    ) -> Result<InitStatus, SimError> {
        self.behaviour.initialise_variables(ctx)
    }

    /// Buffers an incoming event.
    pub fn deliver(&mut self, event: Event) {
        self.inbox.push(event);
    }

    /// Time of the next activation, internal or external.
    pub fn next_activation(&self) -> SimTime {
        match self.inbox.next_time() {
            Some(t) if t < self.next_internal => t,
            _ => self.next_internal,
        }
    }

    /// Returns `true` when an internal transition is due at `now`.
    pub fn is_imminent(&self, now: SimTime) -> bool {
        self.next_internal <= now
    }

    /// Returns `true` when a buffered event is due at `now`.
    pub fn has_due_input(&self, now: SimTime) -> bool {
        self.inbox.has_due(now)
    }

    pub fn output(&mut self) -> Vec<Event> {
        self.behaviour.output()
    }

    pub fn internal_transition(&mut self, ctx: &mut ModelContext<'_>) -> Result<(), SimError> {
        let now = ctx.now();
        let elapsed = now.since(self.last_transition);
        self.behaviour.internal_transition(elapsed, ctx)?;
        self.reschedule(now);
        Ok(())
    }

    /// Drains one due event from the inbox and applies it.
    ///
    /// Returns `false` when no event was due.
    pub fn external_transition(&mut self, ctx: &mut ModelContext<'_>) -> Result<bool, SimError> {
        let now = ctx.now();
        let Some(event) = self.inbox.pop_due(now) else {
            return Ok(false);
        };
        let elapsed = now.since(self.last_transition);
        self.behaviour.external_transition(elapsed, event, ctx)?;
        self.reschedule(now);
        Ok(true)
    }

    pub fn end_simulation(
        &mut self,
        end: SimTime,
        ctx: &mut ModelContext<'_>,
    ) -> Result<(), SimError> {
        self.behaviour.end_simulation(end, ctx)
    }

    pub fn final_report(&self) -> FinalReport {
        self.behaviour.final_report(&self.uri)
    }

    fn reschedule(&mut self, now: SimTime) {
        self.last_transition = now;
        self.next_internal = now + self.behaviour.time_advance();
    }
}
