//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::devices::architectures::{INTEGRATION, LOCAL_ARCHITECTURES, UNIT_TEST};
use crate::devices::heater::{ExternalTemperatureParams, HeaterParams, TimelineEntry};
use crate::devices::meter::MeterParams;
use crate::sim::event::{EventKind, EventType};
use crate::sim::time::SimTime;
use crate::sim::types::SimulationMode;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run timing, pacing and architecture selection.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Heater physical constants.
    #[serde(default)]
    pub heater: HeaterConfig,
    /// Outside temperature profile.
    #[serde(default)]
    pub external_temperature: ExternalTemperatureConfig,
    /// Electric meter parameters.
    #[serde(default)]
    pub meter: MeterConfig,
    /// Controller actions, in simulated time.
    #[serde(default)]
    pub timeline: Vec<TimelineAction>,
}

/// Run timing, pacing and architecture selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulated start time (hours).
    pub start_h: f64,
    /// Simulated duration (hours, must be > 0).
    pub duration_h: f64,
    /// Simulated hours per wall-clock hour in SIL mode (must be > 0).
    pub acceleration: f64,
    /// `"mil"`, `"sil"` or `"hil"`.
    pub mode: String,
    /// Local architecture identifier.
    pub architecture: String,
    /// Wall-clock delay before the SIL epoch (milliseconds).
    pub epoch_delay_ms: u64,
    /// Master random seed.
    pub seed: u64,
    /// Record every exported-variable sample.
    pub record_trace: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_h: 0.0,
            duration_h: 1.0,
            acceleration: 360.0,
            mode: "mil".to_string(),
            architecture: UNIT_TEST.to_string(),
            epoch_delay_ms: 100,
            seed: 42,
            record_trace: true,
        }
    }
}

/// Heater physical constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaterConfig {
    /// Mains tension (V).
    pub tension_v: f64,
    /// Maximum heating power (W).
    pub max_power_w: f64,
    /// Draw when on but not heating (W).
    pub idle_power_w: f64,
    /// Heating plate temperature (°C).
    pub plate_temperature_c: f64,
    /// Insulation transfer constant (hours).
    pub insulation_transfer_constant: f64,
    /// Heating transfer constant at full power (hours).
    pub min_heating_transfer_constant: f64,
    /// Room temperature at start (°C).
    pub initial_temperature_c: f64,
    /// Euler step (seconds).
    pub step_s: f64,
    /// Shortest integrated interval (seconds).
    pub tolerance_s: f64,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        let p = HeaterParams::default();
        Self {
            tension_v: p.tension_v,
            max_power_w: p.max_power_w,
            idle_power_w: p.idle_power_w,
            plate_temperature_c: p.plate_temperature_c,
            insulation_transfer_constant: p.insulation_transfer_constant,
            min_heating_transfer_constant: p.min_heating_transfer_constant,
            initial_temperature_c: p.initial_temperature_c,
            step_s: 60.0,
            tolerance_s: 0.36,
        }
    }
}

/// Outside temperature profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExternalTemperatureConfig {
    /// Coldest temperature, at the start of each period (°C).
    pub min_c: f64,
    /// Warmest temperature, mid-period (°C).
    pub max_c: f64,
    /// Profile period (hours).
    pub period_h: f64,
    /// Gaussian noise standard deviation (°C).
    pub noise_std: f64,
    /// Re-evaluation step (seconds).
    pub step_s: f64,
}

impl Default for ExternalTemperatureConfig {
    fn default() -> Self {
        Self {
            min_c: 5.0,
            max_c: 19.0,
            period_h: 24.0,
            noise_std: 0.0,
            step_s: 60.0,
        }
    }
}

/// Electric meter parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
    /// Mains tension (V).
    pub tension_v: f64,
    /// Subscribed power (W).
    pub available_power_w: f64,
    /// Sampling step (seconds).
    pub step_s: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            tension_v: 220.0,
            available_power_w: 3000.0,
            step_s: 60.0,
        }
    }
}

/// One controller action of the `[[timeline]]` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineAction {
    /// Simulated time of the action (hours).
    pub time_h: f64,
    /// `"switch_on"`, `"switch_off"`, `"heat"`, `"do_not_heat"` or `"set_power"`.
    pub action: String,
    /// Heating power for `"set_power"` (W).
    #[serde(default)]
    pub power_w: Option<f64>,
}

impl TimelineAction {
    fn new(minutes: f64, action: EventType, power_w: Option<f64>) -> Self {
        Self {
            time_h: minutes / 60.0,
            action: action.name().to_string(),
            power_w,
        }
    }

    /// Converts the action into a timed heater event.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown action or a `set_power`
    /// action without a power.
    pub fn to_entry(&self, index: usize) -> Result<TimelineEntry, ConfigError> {
        let field = |name: &str| format!("timeline[{index}].{name}");
        let kind = match (EventType::from_name(&self.action), self.power_w) {
            (Some(EventType::SetPower), Some(power_w)) => EventKind::SetPower { power_w },
            (Some(EventType::SetPower), None) => {
                return Err(ConfigError::new(field("power_w"), "required by set_power"));
            }
            (Some(EventType::SwitchOn), _) => EventKind::SwitchOn,
            (Some(EventType::SwitchOff), _) => EventKind::SwitchOff,
            (Some(EventType::Heat), _) => EventKind::Heat,
            (Some(EventType::DoNotHeat), _) => EventKind::DoNotHeat,
            (None, _) => {
                let known: Vec<&str> = EventType::ALL.iter().map(|t| t.name()).collect();
                return Err(ConfigError::new(
                    field("action"),
                    format!(
                        "unknown action \"{}\", expected one of {}",
                        self.action,
                        known.join(", ")
                    ),
                ));
            }
        };
        Ok(TimelineEntry::new(SimTime::from_hours(self.time_h), kind))
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.duration_h"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Controller actions of the round-trip scenario: on at 5 min, heat at
/// 10 min, 880 W at 14.5 min, off at 16.5 min.
fn round_trip_timeline() -> Vec<TimelineAction> {
    vec![
        TimelineAction::new(5.0, EventType::SwitchOn, None),
        TimelineAction::new(10.0, EventType::Heat, None),
        TimelineAction::new(14.5, EventType::SetPower, Some(880.0)),
        TimelineAction::new(16.5, EventType::SwitchOff, None),
    ]
}

impl ScenarioConfig {
    /// Returns the baseline scenario: the round-trip timeline on the
    /// unit-test architecture.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            heater: HeaterConfig::default(),
            external_temperature: ExternalTemperatureConfig::default(),
            meter: MeterConfig::default(),
            timeline: round_trip_timeline(),
        }
    }

    /// Returns the integration preset: electricity metered next to the
    /// meter, same timeline as the baseline.
    pub fn integration() -> Self {
        Self {
            simulation: SimulationConfig {
                architecture: INTEGRATION.to_string(),
                ..SimulationConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns the cold-day preset: a full noisy winter day with a
    /// morning and an evening heating period.
    pub fn cold_day() -> Self {
        let hour = 60.0;
        Self {
            simulation: SimulationConfig {
                duration_h: 24.0,
                architecture: INTEGRATION.to_string(),
                ..SimulationConfig::default()
            },
            heater: HeaterConfig {
                initial_temperature_c: 16.0,
                ..HeaterConfig::default()
            },
            external_temperature: ExternalTemperatureConfig {
                min_c: -5.0,
                max_c: 5.0,
                noise_std: 0.3,
                ..ExternalTemperatureConfig::default()
            },
            meter: MeterConfig::default(),
            timeline: vec![
                TimelineAction::new(6.0 * hour, EventType::SwitchOn, None),
                TimelineAction::new(6.0 * hour, EventType::Heat, None),
                TimelineAction::new(8.0 * hour, EventType::SetPower, Some(1200.0)),
                TimelineAction::new(9.0 * hour, EventType::DoNotHeat, None),
                TimelineAction::new(18.0 * hour, EventType::Heat, None),
                TimelineAction::new(18.0 * hour, EventType::SetPower, Some(2000.0)),
                TimelineAction::new(23.0 * hour, EventType::SwitchOff, None),
            ],
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "integration", "cold_day"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "integration" => Ok(Self::integration()),
            "cold_day" => Ok(Self::cold_day()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Parsed simulation mode; `None` if `simulation.mode` is unknown.
    pub fn mode(&self) -> Option<SimulationMode> {
        SimulationMode::from_name(&self.simulation.mode)
    }

    pub fn heater_params(&self) -> HeaterParams {
        let h = &self.heater;
        HeaterParams {
            tension_v: h.tension_v,
            max_power_w: h.max_power_w,
            idle_power_w: h.idle_power_w,
            plate_temperature_c: h.plate_temperature_c,
            insulation_transfer_constant: h.insulation_transfer_constant,
            min_heating_transfer_constant: h.min_heating_transfer_constant,
            initial_temperature_c: h.initial_temperature_c,
            step_h: h.step_s / SECONDS_PER_HOUR,
            tolerance_h: h.tolerance_s / SECONDS_PER_HOUR,
        }
    }

    pub fn external_temperature_params(&self) -> ExternalTemperatureParams {
        let e = &self.external_temperature;
        ExternalTemperatureParams {
            min_c: e.min_c,
            max_c: e.max_c,
            period_h: e.period_h,
            noise_std: e.noise_std,
            seed: self.simulation.seed,
            step_h: e.step_s / SECONDS_PER_HOUR,
        }
    }

    pub fn meter_params(&self) -> MeterParams {
        let m = &self.meter;
        MeterParams {
            tension_v: m.tension_v,
            available_power_w: m.available_power_w,
            step_h: m.step_s / SECONDS_PER_HOUR,
        }
    }

    /// Timeline as heater events.
    ///
    /// # Errors
    ///
    /// Returns every malformed action.
    pub fn timeline_entries(&self) -> Result<Vec<TimelineEntry>, Vec<ConfigError>> {
        let mut entries = Vec::with_capacity(self.timeline.len());
        let mut errors = Vec::new();
        for (i, action) in self.timeline.iter().enumerate() {
            match action.to_entry(i) {
                Ok(entry) => entries.push(entry),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() { Ok(entries) } else { Err(errors) }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: f64| {
            if !(value > 0.0 && value.is_finite()) {
                errors.push(ConfigError::new(field, "must be > 0"));
            }
        };

        let s = &self.simulation;
        positive("simulation.duration_h", s.duration_h);
        positive("simulation.acceleration", s.acceleration);
        let h = &self.heater;
        positive("heater.tension_v", h.tension_v);
        positive("heater.max_power_w", h.max_power_w);
        positive("heater.insulation_transfer_constant", h.insulation_transfer_constant);
        positive("heater.min_heating_transfer_constant", h.min_heating_transfer_constant);
        positive("heater.step_s", h.step_s);
        let e = &self.external_temperature;
        positive("external_temperature.period_h", e.period_h);
        positive("external_temperature.step_s", e.step_s);
        let m = &self.meter;
        positive("meter.tension_v", m.tension_v);
        positive("meter.step_s", m.step_s);

        for (field, value) in [
            ("simulation.start_h", s.start_h),
            ("heater.plate_temperature_c", h.plate_temperature_c),
            ("heater.initial_temperature_c", h.initial_temperature_c),
            ("external_temperature.min_c", e.min_c),
            ("external_temperature.max_c", e.max_c),
        ] {
            if !value.is_finite() {
                errors.push(ConfigError::new(field, "must be finite"));
            }
        }

        if self.mode().is_none() {
            errors.push(ConfigError::new(
                "simulation.mode",
                format!(
                    "must be one of {}, got \"{}\"",
                    SimulationMode::NAMES.join(", "),
                    s.mode
                ),
            ));
        }
        if !LOCAL_ARCHITECTURES.contains(&s.architecture.as_str()) {
            errors.push(ConfigError::new(
                "simulation.architecture",
                format!(
                    "must be one of {}, got \"{}\"",
                    LOCAL_ARCHITECTURES.join(", "),
                    s.architecture
                ),
            ));
        }
        if !(0.0..=h.max_power_w).contains(&h.idle_power_w) {
            errors.push(ConfigError::new(
                "heater.idle_power_w",
                "must be in [0, heater.max_power_w]",
            ));
        }
        if h.tolerance_s < 0.0 || h.tolerance_s >= h.step_s {
            errors.push(ConfigError::new(
                "heater.tolerance_s",
                "must be in [0, heater.step_s)",
            ));
        }
        if e.min_c > e.max_c {
            errors.push(ConfigError::new(
                "external_temperature.min_c",
                "must be <= external_temperature.max_c",
            ));
        }
        if e.noise_std < 0.0 {
            errors.push(ConfigError::new("external_temperature.noise_std", "must be >= 0"));
        }
        if m.available_power_w < 0.0 {
            errors.push(ConfigError::new("meter.available_power_w", "must be >= 0"));
        }

        let end_h = s.start_h + s.duration_h;
        for (i, action) in self.timeline.iter().enumerate() {
            if !(s.start_h..=end_h).contains(&action.time_h) {
                errors.push(ConfigError::new(
                    format!("timeline[{i}].time_h"),
                    format!("must be within [{}, {end_h}]", s.start_h),
                ));
            }
            if let Some(p) = action.power_w {
                if !(0.0..=h.max_power_w).contains(&p) {
                    errors.push(ConfigError::new(
                        format!("timeline[{i}].power_w"),
                        "must be in [0, heater.max_power_w]",
                    ));
                }
            }
            if let Err(err) = action.to_entry(i) {
                errors.push(err);
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(matches!(err, Err(ref e) if e.message.contains("unknown preset")));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
duration_h = 2.0
mode = "sil"
architecture = "heater-integration"
acceleration = 3600.0

[heater]
max_power_w = 1500.0
step_s = 30.0

[external_temperature]
min_c = 0.0
max_c = 10.0

[meter]
available_power_w = 6000.0

[[timeline]]
time_h = 0.1
action = "switch_on"

[[timeline]]
time_h = 0.2
action = "set_power"
power_w = 750.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().and_then(ScenarioConfig::mode), Some(SimulationMode::Sil));
        assert_eq!(cfg.as_ref().map(|c| c.timeline.len()), Some(2));
        let step = cfg.as_ref().map(|c| c.heater_params().step_h);
        assert_eq!(step, Some(30.0 / 3600.0));
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[heater]
wattage = 10
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\nseed = 99\n");
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.simulation.seed), Some(99));
        assert_eq!(cfg.as_ref().map(|c| c.heater.max_power_w), Some(2000.0));
        assert_eq!(cfg.as_ref().map(|c| c.timeline.is_empty()), Some(true));
    }

    #[test]
    fn validation_catches_bad_mode_and_architecture() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.mode = "xil".into();
        cfg.simulation.architecture = "toaster".into();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.mode"));
        assert!(errors.iter().any(|e| e.field == "simulation.architecture"));
    }

    #[test]
    fn validation_catches_non_positive_acceleration() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.acceleration = 0.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.acceleration"));
    }

    #[test]
    fn validation_catches_non_finite_temperatures() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.heater.plate_temperature_c = f64::NAN;
        cfg.heater.initial_temperature_c = f64::INFINITY;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "heater.plate_temperature_c"));
        assert!(errors.iter().any(|e| e.field == "heater.initial_temperature_c"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn validation_catches_bad_timeline() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.timeline.push(TimelineAction {
            time_h: 0.5,
            action: "explode".into(),
            power_w: None,
        });
        cfg.timeline.push(TimelineAction {
            time_h: 9.0,
            action: "set_power".into(),
            power_w: Some(5000.0),
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "timeline[4].action"));
        assert!(errors.iter().any(|e| e.field == "timeline[5].time_h"));
        assert!(errors.iter().any(|e| e.field == "timeline[5].power_w"));
    }

    #[test]
    fn timeline_converts_to_events() {
        let entries = ScenarioConfig::baseline().timeline_entries();
        let entries = entries.unwrap_or_default();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].kind, EventKind::SetPower { power_w: 880.0 });
        assert!((entries[2].at.hours() - 14.5 / 60.0).abs() < 1e-12);
    }
}
