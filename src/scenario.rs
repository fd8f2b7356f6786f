//! A validated run plan built from a [`ScenarioConfig`], executed in the
//! configured simulation mode.
//!
//! In MIL mode the controller timeline is played by a tester model inside
//! the architecture and the simulator runs detached. In SIL mode the
//! simulator runs in real time on its own thread and this module plays the
//! owning component, triggering each timeline action at its wall-clock
//! instant.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{ConfigError, ScenarioConfig};
use crate::devices::architectures::{CONTROL_TARGET, DeviceSetup, local_architecture};
use crate::devices::heater::TimelineEntry;
use crate::error::SimError;
use crate::sim::engine::{RunOutcome, Simulator};
use crate::sim::event::{Event, EventKind};
use crate::sim::realtime::{RealTimeClock, RealTimeRunner, RunHandle};
use crate::sim::time::SimTime;
use crate::sim::types::{ModelUri, OwnerFields, RunParameters, SimulationMode};

/// A validated run plan.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub mode: SimulationMode,
    pub architecture: String,
    pub start: SimTime,
    pub duration_h: f64,
    pub acceleration: f64,
    pub epoch_delay: Duration,
    pub record_trace: bool,
    pub setup: DeviceSetup,
    pub timeline: Vec<TimelineEntry>,
    owner: OwnerFields,
}

impl Scenario {
    /// Validates `config` and converts it into a run plan.
    ///
    /// # Errors
    ///
    /// Returns every validation error found.
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, Vec<ConfigError>> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        let mode = config
            .mode()
            .ok_or_else(|| vec![ConfigError::new("simulation.mode", "unknown mode")])?;
        let timeline = config.timeline_entries()?;
        let s = &config.simulation;
        Ok(Self {
            mode,
            architecture: s.architecture.clone(),
            start: SimTime::from_hours(s.start_h),
            duration_h: s.duration_h,
            acceleration: s.acceleration,
            epoch_delay: Duration::from_millis(s.epoch_delay_ms),
            record_trace: s.record_trace,
            setup: DeviceSetup {
                heater: config.heater_params(),
                external_temperature: config.external_temperature_params(),
                meter: config.meter_params(),
                tester: None,
            },
            timeline,
            owner: OwnerFields::new(),
        })
    }

    /// Observable fields the models push values into during the run.
    pub fn owner(&self) -> &OwnerFields {
        &self.owner
    }

    fn run_parameters(&self) -> RunParameters {
        RunParameters {
            record_trace: self.record_trace,
            ..RunParameters::with_owner(self.owner.clone())
        }
    }

    /// Builds the simulator of this plan; `scripted` adds the tester model.
    ///
    /// # Errors
    ///
    /// Returns configuration errors of the architecture.
    pub fn simulator(&self, scripted: bool) -> Result<Simulator, SimError> {
        let setup = DeviceSetup {
            tester: scripted.then(|| self.timeline.clone()),
            ..self.setup.clone()
        };
        let architecture = local_architecture(&self.architecture, &setup)?;
        let mut simulator = Simulator::construct(&architecture)?;
        simulator.set_run_parameters(self.run_parameters());
        Ok(simulator)
    }

    /// Runs the plan in its configured mode.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnimplementedMode`] for HIL, or the first
    /// failure of the run.
    pub fn run(&self) -> Result<RunOutcome, SimError> {
        info!(
            mode = %self.mode,
            architecture = %self.architecture,
            duration_h = self.duration_h,
            "scenario starting"
        );
        match self.mode {
            SimulationMode::Mil => self.run_detached(),
            SimulationMode::Sil => self.run_real_time(),
            SimulationMode::Hil => Err(SimError::UnimplementedMode(SimulationMode::Hil)),
        }
    }

    fn run_detached(&self) -> Result<RunOutcome, SimError> {
        let mut simulator = self.simulator(true)?;
        simulator.run_detached(self.start, self.duration_h)
    }

    fn run_real_time(&self) -> Result<RunOutcome, SimError> {
        let simulator = self.simulator(false)?;
        let clock = RealTimeClock::starting_in(
            self.epoch_delay,
            self.start,
            self.duration_h,
            self.acceleration,
        )?;
        let handle = RealTimeRunner::start(simulator, clock)?;
        if let Err(err) = self.drive(&handle) {
            warn!(error = %err, "controller stopped early");
            return handle.wait_until_end().and(Err(err));
        }
        handle.wait_until_end()
    }

    /// Triggers every timeline action at its wall-clock instant; actions
    /// sharing an instant are handed over as one batch.
    fn drive(&self, handle: &RunHandle) -> Result<(), SimError> {
        let target = ModelUri::from(CONTROL_TARGET);
        let mut timeline = self.timeline.clone();
        timeline.sort_by_key(|e| e.at);
        for batch in timeline.chunk_by(|a, b| a.at == b.at) {
            let due = handle.clock().wall_instant(batch[0].at);
            thread::sleep(due.saturating_duration_since(Instant::now()));
            let kinds: Vec<EventKind> = batch.iter().map(|e| e.kind).collect();
            handle.trigger_all(&target, move |at| {
                kinds.into_iter().map(|kind| Event::new(at, kind)).collect()
            })?;
        }
        Ok(())
    }
}
