//! Human-readable final reports, one block per model.

use std::fmt;

use serde::Serialize;

use super::time::SimTime;
use super::types::ModelUri;

/// Label of the total energy line of electricity and meter reports.
pub const TOTAL_CONSUMPTION: &str = "total consumption";
/// Label of the time-weighted mean line of temperature reports.
pub const MEAN_TEMPERATURE: &str = "mean temperature";
/// Label of the meter's largest power debt line.
pub const LARGEST_POWER_DEBT: &str = "largest power debt";
/// Label of the meter's largest power margin line.
pub const LARGEST_POWER_MARGIN: &str = "largest power margin";
/// Label of the discrete state line of state models.
pub const FINAL_STATE: &str = "final state";

const SEPARATOR: &str = "--------------------------------------------------";

/// Value of one report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    Number(f64),
    Text(String),
}

/// One `label = value [unit]` line, optionally stamped with the time the
/// value occurred at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub label: String,
    pub value: ReportValue,
    pub unit: Option<String>,
    pub at: Option<SimTime>,
}

/// The report a model freezes at the end of a run.
///
/// # Examples
///
/// ```
/// use appliance_sil::sim::report::FinalReport;
/// use appliance_sil::sim::types::ModelUri;
///
/// let report = FinalReport::new(ModelUri::from("heater-electricity"))
///     .number("total consumption", 0.5, "kWh");
/// let text = report.to_string();
/// assert!(text.starts_with("Final report of heater-electricity"));
/// assert!(text.contains("total consumption = 0.500000 kWh"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub model: ModelUri,
    pub lines: Vec<ReportLine>,
}

impl FinalReport {
    pub fn new(model: ModelUri) -> Self {
        Self {
            model,
            lines: Vec::new(),
        }
    }

    /// Appends a numeric line with a unit.
    pub fn number(mut self, label: &str, value: f64, unit: &str) -> Self {
        self.lines.push(ReportLine {
            label: label.to_string(),
            value: ReportValue::Number(value),
            unit: Some(unit.to_string()),
            at: None,
        });
        self
    }

    /// Appends a numeric line with a unit and an occurrence time.
    pub fn number_at(mut self, label: &str, value: f64, unit: &str, at: SimTime) -> Self {
        self.lines.push(ReportLine {
            label: label.to_string(),
            value: ReportValue::Number(value),
            unit: Some(unit.to_string()),
            at: Some(at),
        });
        self
    }

    /// Appends a text line.
    pub fn text(mut self, label: &str, value: impl Into<String>) -> Self {
        self.lines.push(ReportLine {
            label: label.to_string(),
            value: ReportValue::Text(value.into()),
            unit: None,
            at: None,
        });
        self
    }

    /// Returns the numeric value of the line labelled `label`.
    pub fn value_of(&self, label: &str) -> Option<f64> {
        self.lines.iter().find(|l| l.label == label).and_then(|l| match l.value {
            ReportValue::Number(v) => Some(v),
            ReportValue::Text(_) => None,
        })
    }

    /// Returns the occurrence time of the line labelled `label`.
    pub fn time_of(&self, label: &str) -> Option<SimTime> {
        self.lines.iter().find(|l| l.label == label).and_then(|l| l.at)
    }

    /// Returns the text value of the line labelled `label`.
    pub fn text_of(&self, label: &str) -> Option<&str> {
        self.lines.iter().find(|l| l.label == label).and_then(|l| match &l.value {
            ReportValue::Text(s) => Some(s.as_str()),
            ReportValue::Number(_) => None,
        })
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final report of {}", self.model)?;
        for line in &self.lines {
            write!(f, "  {} = ", line.label)?;
            match &line.value {
                ReportValue::Number(v) => write!(f, "{v:.6}")?,
                ReportValue::Text(s) => write!(f, "{s}")?,
            }
            if let Some(unit) = &line.unit {
                write!(f, " {unit}")?;
            }
            if let Some(at) = line.at {
                write!(f, " at {at}")?;
            }
            writeln!(f)?;
        }
        write!(f, "{SEPARATOR}")
    }
}
