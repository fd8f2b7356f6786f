//! Continuous variables and the store that serialises their reads and writes.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::trace;

use crate::error::VariableError;

use super::time::SimTime;
use super::types::VariableId;

/// A named, time-tagged sample with an optional first derivative.
///
/// Once initialised, every update must carry a sample time no earlier than
/// the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousVariable {
    id: VariableId,
    value: f64,
    time: SimTime,
    derivative: Option<f64>,
    initialised: bool,
}

impl ContinuousVariable {
    /// Creates an uninitialised variable.
    pub fn new(id: VariableId) -> Self {
        Self {
            id,
            value: 0.0,
            time: SimTime::ZERO,
            derivative: None,
            initialised: false,
        }
    }

    pub fn id(&self) -> &VariableId {
        &self.id
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Sets the first sample. Re-initialising resets the time tag.
    pub fn initialise(&mut self, value: f64, time: SimTime, derivative: Option<f64>) {
        self.value = value;
        self.time = time;
        self.derivative = derivative;
        self.initialised = true;
    }

    /// Records a new sample.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Uninitialised`] before [`initialise`](Self::initialise)
    /// and [`VariableError::NonMonotonicUpdate`] if `time` precedes the last sample.
    pub fn update(
        &mut self,
        value: f64,
        time: SimTime,
        derivative: Option<f64>,
    ) -> Result<(), VariableError> {
        if !self.initialised {
            return Err(VariableError::Uninitialised(self.id.clone()));
        }
        if time < self.time {
            return Err(VariableError::NonMonotonicUpdate {
                variable: self.id.clone(),
                last: self.time,
                at: time,
            });
        }
        self.value = value;
        self.time = time;
        self.derivative = derivative;
        Ok(())
    }

    /// Last sample value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Time tag of the last sample.
    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn derivative(&self) -> Option<f64> {
        self.derivative
    }

    /// Evaluates the variable at `t`.
    ///
    /// Extrapolates linearly from the last sample when a derivative is held,
    /// otherwise returns the last sample unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Uninitialised`] before the first sample.
    pub fn evaluate_at(&self, t: SimTime) -> Result<f64, VariableError> {
        if !self.initialised {
            return Err(VariableError::Uninitialised(self.id.clone()));
        }
        Ok(match self.derivative {
            Some(d) => self.value + d * t.since(self.time),
            None => self.value,
        })
    }
}

/// One exported-variable write, kept for export and inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub time_h: f64,
    pub model: String,
    pub variable: String,
    pub value: f64,
    pub derivative: Option<f64>,
}

/// Owns every exported variable of a simulator, plus the import bindings.
///
/// All reads and writes go through the single simulation thread, so the
/// store needs no locking: exporters write through `&mut`, importers read
/// through `&` at activation time.
#[derive(Debug, Default)]
pub struct VariableStore {
    exported: BTreeMap<VariableId, ContinuousVariable>,
    bindings: HashMap<VariableId, VariableId>,
    record_trace: bool,
    trace: Vec<TraceRecord>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an exported variable.
    pub fn declare(&mut self, id: VariableId) {
        self.exported
            .entry(id.clone())
            .or_insert_with(|| ContinuousVariable::new(id));
    }

    /// Binds the imported variable `import` to the exported variable `export`.
    pub fn bind(&mut self, export: VariableId, import: VariableId) {
        self.bindings.insert(import, export);
    }

    /// Enables or disables trace recording.
    pub fn set_record_trace(&mut self, record: bool) {
        self.record_trace = record;
    }

    /// Returns the exported variable `id`.
    pub fn exported(&self, id: &VariableId) -> Result<&ContinuousVariable, VariableError> {
        self.exported
            .get(id)
            .ok_or_else(|| VariableError::Unknown(id.clone()))
    }

    /// Resolves an imported variable to the exporter it is bound to.
    pub fn imported(&self, import: &VariableId) -> Result<&ContinuousVariable, VariableError> {
        let export = self
            .bindings
            .get(import)
            .ok_or_else(|| VariableError::Unbound(import.clone()))?;
        self.exported(export)
    }

    /// Returns `true` when `import` is bound to some exporter.
    pub fn is_bound(&self, import: &VariableId) -> bool {
        self.bindings.contains_key(import)
    }

    /// Initialises an exported variable.
    pub fn initialise(
        &mut self,
        id: &VariableId,
        value: f64,
        time: SimTime,
        derivative: Option<f64>,
    ) -> Result<(), VariableError> {
        let var = self
            .exported
            .get_mut(id)
            .ok_or_else(|| VariableError::Unknown(id.clone()))?;
        var.initialise(value, time, derivative);
        self.record(id, value, time, derivative);
        Ok(())
    }

    /// Writes a new sample of an exported variable.
    pub fn update(
        &mut self,
        id: &VariableId,
        value: f64,
        time: SimTime,
        derivative: Option<f64>,
    ) -> Result<(), VariableError> {
        let var = self
            .exported
            .get_mut(id)
            .ok_or_else(|| VariableError::Unknown(id.clone()))?;
        var.update(value, time, derivative)?;
        self.record(id, value, time, derivative);
        Ok(())
    }

    fn record(&mut self, id: &VariableId, value: f64, time: SimTime, derivative: Option<f64>) {
        trace!(variable = %id, value, %time, "variable sample");
        if self.record_trace {
            self.trace.push(TraceRecord {
                time_h: time.hours(),
                model: id.model.to_string(),
                variable: id.name.clone(),
                value,
                derivative,
            });
        }
    }

    /// Exported variables that are still uninitialised.
    pub fn uninitialised(&self) -> impl Iterator<Item = &VariableId> {
        self.exported
            .values()
            .filter(|v| !v.is_initialised())
            .map(ContinuousVariable::id)
    }

    /// Recorded trace, in write order.
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// Moves the recorded trace out of the store.
    pub fn take_trace(&mut self) -> Vec<TraceRecord> {
        std::mem::take(&mut self.trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_id() -> VariableId {
        VariableId::new("room", "temperature")
    }

    #[test]
    fn evaluate_extrapolates_with_derivative() {
        let mut v = ContinuousVariable::new(temp_id());
        v.initialise(19.0, SimTime::from_hours(1.0), Some(2.0));
        let at = v.evaluate_at(SimTime::from_hours(1.5));
        assert_eq!(at, Ok(20.0));
    }

    #[test]
    fn evaluate_without_derivative_holds_sample() {
        let mut v = ContinuousVariable::new(temp_id());
        v.initialise(19.0, SimTime::ZERO, None);
        assert_eq!(v.evaluate_at(SimTime::from_hours(10.0)), Ok(19.0));
    }

    #[test]
    fn update_rejects_going_back_in_time() {
        let mut v = ContinuousVariable::new(temp_id());
        v.initialise(19.0, SimTime::from_hours(2.0), None);
        let err = v.update(20.0, SimTime::from_hours(1.0), None);
        assert!(matches!(err, Err(VariableError::NonMonotonicUpdate { .. })));
        assert!(v.update(20.0, SimTime::from_hours(2.0), None).is_ok());
    }

    #[test]
    fn uninitialised_reads_fail() {
        let v = ContinuousVariable::new(temp_id());
        assert!(matches!(
            v.evaluate_at(SimTime::ZERO),
            Err(VariableError::Uninitialised(_))
        ));
    }

    #[test]
    fn store_resolves_bindings() {
        let export = VariableId::new("outside", "externalTemperature");
        let import = VariableId::new("room", "externalTemperature");
        let mut store = VariableStore::new();
        store.declare(export.clone());
        assert!(matches!(
            store.imported(&import),
            Err(VariableError::Unbound(_))
        ));

        store.bind(export.clone(), import.clone());
        assert!(store.is_bound(&import));
        assert!(store.initialise(&export, 10.0, SimTime::ZERO, None).is_ok());
        assert_eq!(store.imported(&import).map(ContinuousVariable::value), Ok(10.0));
    }

    #[test]
    fn store_records_trace_only_when_enabled() {
        let id = temp_id();
        let mut store = VariableStore::new();
        store.declare(id.clone());
        assert!(store.initialise(&id, 1.0, SimTime::ZERO, None).is_ok());
        assert!(store.trace().is_empty());

        store.set_record_trace(true);
        assert!(store.update(&id, 2.0, SimTime::from_hours(1.0), None).is_ok());
        assert_eq!(store.trace().len(), 1);
        assert_eq!(store.take_trace()[0].value, 2.0);
        assert!(store.trace().is_empty());
    }

    #[test]
    fn uninitialised_lists_pending_exports() {
        let mut store = VariableStore::new();
        store.declare(VariableId::new("a", "x"));
        store.declare(VariableId::new("b", "y"));
        assert!(store.initialise(&VariableId::new("a", "x"), 0.0, SimTime::ZERO, None).is_ok());
        let pending: Vec<_> = store.uninitialised().cloned().collect();
        assert_eq!(pending, vec![VariableId::new("b", "y")]);
    }
}
