//! Simulated time, expressed in hours.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

use serde::Serialize;

/// Milliseconds in one simulated time unit (the hour).
pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// A point on the simulated time line, in hours since the simulation origin.
///
/// Wraps an `f64` so it can carry a total order (`f64::total_cmp`) and be used
/// as a sort key for events and activations.
///
/// # Examples
///
/// ```
/// use appliance_sil::sim::time::SimTime;
///
/// let t = SimTime::from_minutes(90.0);
/// assert_eq!(t.hours(), 1.5);
/// assert_eq!((t + 0.5).since(t), 0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// The simulation origin.
    pub const ZERO: SimTime = SimTime(0.0);
    /// "No further internal activity".
    pub const INFINITY: SimTime = SimTime(f64::INFINITY);

    /// Creates a time from a number of hours.
    pub fn from_hours(hours: f64) -> Self {
        Self(hours)
    }

    /// Creates a time from a number of minutes.
    pub fn from_minutes(minutes: f64) -> Self {
        Self(minutes / 60.0)
    }

    /// Creates a time from a number of seconds.
    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds / 3600.0)
    }

    /// Returns the time in hours.
    pub fn hours(self) -> f64 {
        self.0
    }

    /// Returns the elapsed hours from `earlier` to `self`.
    pub fn since(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }

    /// Returns `true` unless this is [`SimTime::INFINITY`].
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, hours: f64) -> SimTime {
        SimTime(self.0 + hours)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} h", self.0)
    }
}
