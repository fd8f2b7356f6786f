//! Identities, simulation modes and run parameters shared by the kernel and models.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Identity of an atomic model or of an architecture boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModelUri(String);

impl ModelUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelUri {
    fn from(uri: &str) -> Self {
        Self(uri.to_string())
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A continuous variable, named within the model that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableId {
    pub model: ModelUri,
    pub name: String,
}

impl VariableId {
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: ModelUri::new(model),
            name: name.into(),
        }
    }

    pub fn of(model: &ModelUri, name: &str) -> Self {
        Self {
            model: model.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.name)
    }
}

/// How a simulation is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Model-in-the-loop: detached, as fast as possible.
    Mil,
    /// Software-in-the-loop: real time, driven by the owning component.
    Sil,
    /// Hardware-in-the-loop. Not implemented.
    Hil,
}

impl SimulationMode {
    /// Names accepted by [`SimulationMode::from_name`].
    pub const NAMES: &[&str] = &["mil", "sil", "hil"];

    /// Parses a mode name (`"mil"`, `"sil"` or `"hil"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mil" => Some(Self::Mil),
            "sil" => Some(Self::Sil),
            "hil" => Some(Self::Hil),
            _ => None,
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationMode::Mil => "MIL",
            SimulationMode::Sil => "SIL",
            SimulationMode::Hil => "HIL",
        };
        f.write_str(name)
    }
}

/// Component-level observable fields that models may push values into.
///
/// Cloning shares the underlying fields, so the owning component keeps one
/// clone and hands another to the simulator through [`RunParameters`].
#[derive(Debug, Clone, Default)]
pub struct OwnerFields {
    fields: Arc<Mutex<BTreeMap<String, f64>>>,
}

impl OwnerFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observable field `key`.
    pub fn publish(&self, key: &str, value: f64) {
        let mut fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        fields.insert(key.to_string(), value);
    }

    /// Returns the last value pushed into `key`.
    pub fn get(&self, key: &str) -> Option<f64> {
        let fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        fields.get(key).copied()
    }
}

/// Per-run parameters handed to every model before initialisation.
#[derive(Debug, Clone, Default)]
pub struct RunParameters {
    /// Back-reference into the owning component.
    pub owner: Option<OwnerFields>,
    /// Record every exported-variable write into the run trace.
    pub record_trace: bool,
}

impl RunParameters {
    pub fn with_owner(owner: OwnerFields) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }
}
