//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::sim::report::FinalReport;

/// What was run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// `"MIL"` or `"SIL"`.
    pub mode: String,
    /// Local architecture identifier.
    pub architecture: String,
    /// Simulated duration (hours).
    pub duration_h: f64,
    /// Number of models with a final report.
    pub models: usize,
    /// Number of recorded trace samples.
    pub samples: usize,
}

/// `GET /reports` body.
#[derive(Debug, Serialize)]
pub struct ReportsResponse<'a> {
    pub summary: &'a RunSummary,
    pub reports: &'a [FinalReport],
}

/// Optional filters of the trace endpoint.
#[derive(Debug, Deserialize)]
pub struct TraceQuery {
    /// Start time in hours (inclusive).
    pub from: Option<f64>,
    /// End time in hours (inclusive).
    pub to: Option<f64>,
    /// Only samples of this model.
    pub model: Option<String>,
    /// Only samples of this variable.
    pub variable: Option<String>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
