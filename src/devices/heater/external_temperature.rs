//! Outside temperature following a daily cosine profile with optional
//! Gaussian noise.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::SimError;
use crate::sim::event::Event;
use crate::sim::model::{Behaviour, InitStatus, ModelContext, ModelDescriptor, ModelInterface};
use crate::sim::report::FinalReport;
use crate::sim::time::SimTime;
use crate::sim::types::ModelUri;

use super::EXTERNAL_TEMPERATURE;

/// Parameters of the outside temperature profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalTemperatureParams {
    /// Coldest temperature, reached at the start of each period (°C).
    pub min_c: f64,
    /// Warmest temperature, reached mid-period (°C).
    pub max_c: f64,
    /// Profile period, in hours.
    pub period_h: f64,
    /// Standard deviation of the Gaussian noise (°C).
    pub noise_std: f64,
    pub seed: u64,
    /// Re-evaluation step, in hours.
    pub step_h: f64,
}

impl Default for ExternalTemperatureParams {
    fn default() -> Self {
        Self {
            min_c: 5.0,
            max_c: 19.0,
            period_h: 24.0,
            noise_std: 0.0,
            seed: 42,
            step_h: 1.0 / 60.0,
        }
    }
}

impl ExternalTemperatureParams {
    /// A flat profile at `temperature_c`.
    pub fn constant(temperature_c: f64) -> Self {
        Self {
            min_c: temperature_c,
            max_c: temperature_c,
            ..Self::default()
        }
    }

    /// Noise-free temperature at `t`.
    pub fn profile_c(&self, t: SimTime) -> f64 {
        let half_amp = (self.max_c - self.min_c) / 2.0;
        let angle = 2.0 * PI * t.hours() / self.period_h;
        self.min_c + half_amp * (1.0 - angle.cos())
    }

    /// Time derivative of the noise-free profile at `t`, in °C per hour.
    pub fn profile_slope(&self, t: SimTime) -> f64 {
        let half_amp = (self.max_c - self.min_c) / 2.0;
        let omega = 2.0 * PI / self.period_h;
        half_amp * omega * (omega * t.hours()).sin()
    }
}

#[derive(Debug)]
pub struct ExternalTemperature {
    params: ExternalTemperatureParams,
    rng: StdRng,
    lowest_c: f64,
    highest_c: f64,
}

impl ExternalTemperature {
    pub fn new(params: ExternalTemperatureParams) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(params.seed),
            lowest_c: f64::INFINITY,
            highest_c: f64::NEG_INFINITY,
        }
    }

    pub fn descriptor(uri: &str, params: ExternalTemperatureParams) -> ModelDescriptor {
        ModelDescriptor::new(
            uri,
            ModelInterface::new().exporting(EXTERNAL_TEMPERATURE),
            move || Box::new(ExternalTemperature::new(params)),
        )
    }

    fn sample(&mut self, t: SimTime) -> f64 {
        let noise = if self.params.noise_std > 0.0 {
            // Box-Muller
            let u1: f64 = self.rng.random::<f64>().clamp(1e-12, 1.0);
            let u2: f64 = self.rng.random::<f64>();
            (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * self.params.noise_std
        } else {
            0.0
        };
        let value = self.params.profile_c(t) + noise;
        self.lowest_c = self.lowest_c.min(value);
        self.highest_c = self.highest_c.max(value);
        value
    }
}

impl Behaviour for ExternalTemperature {
    fn initialise_state(&mut self, _start: SimTime) {
        self.rng = StdRng::seed_from_u64(self.params.seed);
        self.lowest_c = f64::INFINITY;
        self.highest_c = f64::NEG_INFINITY;
    }

    fn initialise_variables(&mut self, ctx: &mut ModelContext<'_>) -> Result<InitStatus, SimError> {
        if ctx.exported(EXTERNAL_TEMPERATURE)?.is_initialised() {
            return Ok(InitStatus::done());
        }
        let now = ctx.now();
        let value = self.sample(now);
        ctx.initialise_export(EXTERNAL_TEMPERATURE, value, Some(self.params.profile_slope(now)))?;
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
        let value = self.sample(now);
        ctx.update_export(EXTERNAL_TEMPERATURE, value, Some(self.params.profile_slope(now)))?;
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
        FinalReport::new(uri.clone())
            .number("lowest external temperature", self.lowest_c, "°C")
            .number("highest external temperature", self.highest_c, "°C")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_spans_min_to_max() {
        let p = ExternalTemperatureParams::default();
        assert!((p.profile_c(SimTime::ZERO) - 5.0).abs() < 1e-12);
        assert!((p.profile_c(SimTime::from_hours(12.0)) - 19.0).abs() < 1e-12);
        assert!((p.profile_c(SimTime::from_hours(24.0)) - 5.0).abs() < 1e-9);
        assert!(p.profile_slope(SimTime::from_hours(6.0)) > 0.0);
        assert!(p.profile_slope(SimTime::from_hours(18.0)) < 0.0);
    }

    #[test]
    fn constant_profile_is_flat() {
        let p = ExternalTemperatureParams::constant(19.0);
        assert_eq!(p.profile_c(SimTime::from_hours(7.3)), 19.0);
        assert_eq!(p.profile_slope(SimTime::from_hours(7.3)), 0.0);
    }

    #[test]
    fn noise_is_reproducible_per_run() {
        let params = ExternalTemperatureParams {
            noise_std: 0.5,
            ..ExternalTemperatureParams::default()
        };
        let mut model = ExternalTemperature::new(params);
        let t = SimTime::from_hours(3.0);
        let first = model.sample(t);
        model.initialise_state(SimTime::ZERO);
        assert_eq!(model.sample(t), first);
        assert_ne!(model.sample(t), first);
    }
}
