//! Real-time pacing: maps simulated time to wall-clock time and runs a
//! simulator on its own thread, accepting externally triggered events.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::SimError;

use super::engine::{RunOutcome, Simulator};
use super::event::Event;
use super::time::{MILLIS_PER_HOUR, SimTime};
use super::types::ModelUri;

/// Maps simulated hours onto wall-clock instants.
///
/// Simulated time `start + h` happens at wall time
/// `epoch + h * 3_600_000 / acceleration` milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RealTimeClock {
    epoch: Instant,
    start: SimTime,
    duration_h: f64,
    acceleration: f64,
}

impl RealTimeClock {
    /// Creates a clock whose simulated `start` coincides with `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidClock`] unless `duration_h > 0` and
    /// `acceleration > 0`.
    pub fn new(
        epoch: Instant,
        start: SimTime,
        duration_h: f64,
        acceleration: f64,
    ) -> Result<Self, SimError> {
        if !(acceleration > 0.0 && acceleration.is_finite()) {
            return Err(SimError::InvalidClock(format!(
                "acceleration must be positive, got {acceleration}"
            )));
        }
        if !(duration_h > 0.0 && duration_h.is_finite()) {
            return Err(SimError::InvalidClock(format!(
                "duration must be positive, got {duration_h} h"
            )));
        }
        Ok(Self {
            epoch,
            start,
            duration_h,
            acceleration,
        })
    }

    /// Creates a clock whose epoch lies `delay` after now, leaving the
    /// owning component time to synchronise its own timeline.
    ///
    /// # Errors
    ///
    /// See [`RealTimeClock::new`].
    pub fn starting_in(
        delay: Duration,
        start: SimTime,
        duration_h: f64,
        acceleration: f64,
    ) -> Result<Self, SimError> {
        Self::new(Instant::now() + delay, start, duration_h, acceleration)
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn start(&self) -> SimTime {
        self.start
    }

    pub fn end(&self) -> SimTime {
        self.start + self.duration_h
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Wall-clock milliseconds matching `sim_offset_h` simulated hours.
    pub fn wall_delay_ms(&self, sim_offset_h: f64) -> f64 {
        sim_offset_h * MILLIS_PER_HOUR / self.acceleration
    }

    /// Wall-clock instant at which simulated time `t` happens.
    pub fn wall_instant(&self, t: SimTime) -> Instant {
        let offset_h = t.since(self.start).max(0.0);
        let delay_ms = self.wall_delay_ms(offset_h);
        if delay_ms.is_finite() {
            self.epoch + Duration::from_secs_f64(delay_ms / 1000.0)
        } else {
            self.wall_instant(self.end())
        }
    }

    /// Simulated time at wall instant `at`, clamped to the run interval.
    pub fn current_sim_time(&self, at: Instant) -> SimTime {
        let wall_ms = at.saturating_duration_since(self.epoch).as_secs_f64() * 1000.0;
        let offset_h = (wall_ms * self.acceleration / MILLIS_PER_HOUR).min(self.duration_h);
        self.start + offset_h
    }
}

type EventBuilder = Box<dyn FnOnce(SimTime) -> Vec<Event> + Send>;

struct Injection {
    target: ModelUri,
    build: EventBuilder,
}

/// Handle on a running real-time simulation.
pub struct RunHandle {
    clock: RealTimeClock,
    sender: Option<Sender<Injection>>,
    thread: Option<JoinHandle<Result<RunOutcome, SimError>>>,
}

impl RunHandle {
    pub fn clock(&self) -> &RealTimeClock {
        &self.clock
    }

    /// Hands an externally triggered event to the simulation thread.
    ///
    /// `build` receives the simulated time at which the event is applied,
    /// so the event carries the time the simulator actually reached.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RunAborted`] once the simulation thread has
    /// stopped.
    pub fn trigger<F>(&self, target: &ModelUri, build: F) -> Result<(), SimError>
    where
        F: FnOnce(SimTime) -> Event + Send + 'static,
    {
        self.trigger_all(target, move |at| vec![build(at)])
    }

    /// Hands several simultaneous events to the simulation thread.
    ///
    /// Every event is built from one captured simulated time, so the
    /// target's mailbox orders them by priority rather than by arrival.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RunAborted`] once the simulation thread has
    /// stopped.
    pub fn trigger_all<F>(&self, target: &ModelUri, build: F) -> Result<(), SimError>
    where
        F: FnOnce(SimTime) -> Vec<Event> + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SimError::RunAborted("run handle already closed".into()))?;
        sender
            .send(Injection {
                target: target.clone(),
                build: Box::new(build),
            })
            .map_err(|_| SimError::RunAborted("simulation thread has stopped".into()))
    }

    /// Blocks until the simulated end time, then returns the outcome.
    ///
    /// # Errors
    ///
    /// Returns the simulator's own error, or [`SimError::RunAborted`] if the
    /// simulation thread panicked.
    pub fn wait_until_end(mut self) -> Result<RunOutcome, SimError> {
        self.sender.take();
        let thread = self
            .thread
            .take()
            .ok_or_else(|| SimError::RunAborted("run already joined".into()))?;
        thread
            .join()
            .map_err(|_| SimError::RunAborted("simulation thread panicked".into()))?
    }
}

/// Runs a simulator paced by a [`RealTimeClock`].
pub struct RealTimeRunner;

impl RealTimeRunner {
    /// Initialises `simulator` at the clock's start and runs it on a
    /// dedicated thread until the clock's end.
    ///
    /// # Errors
    ///
    /// Returns initialisation errors before any thread is spawned.
    pub fn start(mut simulator: Simulator, clock: RealTimeClock) -> Result<RunHandle, SimError> {
        simulator.initialise(clock.start())?;
        let (sender, receiver) = mpsc::channel();
        info!(
            simulator = %simulator.uri(),
            start = %clock.start(),
            end = %clock.end(),
            acceleration = clock.acceleration(),
            "real-time run started"
        );
        let thread = thread::Builder::new()
            .name(format!("sim-{}", simulator.uri()))
            .spawn(move || run_paced(simulator, clock, receiver))
            .map_err(|e| SimError::RunAborted(format!("cannot spawn simulation thread: {e}")))?;
        Ok(RunHandle {
            clock,
            sender: Some(sender),
            thread: Some(thread),
        })
    }
}

fn run_paced(
    mut simulator: Simulator,
    clock: RealTimeClock,
    receiver: Receiver<Injection>,
) -> Result<RunOutcome, SimError> {
    let end = clock.end();
    let mut open = true;
    loop {
        let next = simulator.next_event_time().min(end);
        if let Some(injection) = wait_for(&receiver, clock.wall_instant(next), &mut open) {
            let at = clock.current_sim_time(Instant::now()).max(simulator.now());
            for event in (injection.build)(at) {
                debug!(target = %injection.target, event = %event.event_type(), %at, "event triggered");
                simulator.schedule_external(&injection.target, event)?;
            }
            continue;
        }
        simulator.run_until(next)?;
        if next >= end {
            break;
        }
    }
    simulator.end_simulation(end)?;
    info!(simulator = %simulator.uri(), "real-time run finished");
    Ok(simulator.outcome())
}

/// Waits until `deadline` or until an injection arrives, whichever is first.
fn wait_for(receiver: &Receiver<Injection>, deadline: Instant, open: &mut bool) -> Option<Injection> {
    let timeout = deadline.saturating_duration_since(Instant::now());
    if *open {
        match receiver.recv_timeout(timeout) {
            Ok(injection) => return Some(injection),
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => *open = false,
        }
    }
    thread::sleep(deadline.saturating_duration_since(Instant::now()));
    None
}
