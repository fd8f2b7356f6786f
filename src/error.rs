//! Structured failures surfaced to the owning component.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::sim::event::EventType;
use crate::sim::time::SimTime;
use crate::sim::types::{ModelUri, SimulationMode, VariableId};

/// Malformed architecture, detected before any activation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArchitectureError {
    #[error("unknown local architecture \"{0}\"")]
    UnknownLocalArchitecture(String),

    #[error("architecture {architecture}: member \"{member}\" declared more than once")]
    DuplicateMember {
        architecture: String,
        member: String,
    },

    #[error("architecture {architecture}: {role} endpoint \"{endpoint}\" is not a member")]
    DanglingEndpoint {
        architecture: String,
        role: &'static str,
        endpoint: String,
    },

    #[error("architecture {architecture}: model {model} does not emit {event_type}")]
    UnknownEmission {
        architecture: String,
        model: ModelUri,
        event_type: EventType,
    },

    #[error("architecture {architecture}: model {model} does not accept {event_type}")]
    UnknownReception {
        architecture: String,
        model: ModelUri,
        event_type: EventType,
    },

    #[error("architecture {architecture}: {variable} is not declared by its model")]
    UndeclaredVariable {
        architecture: String,
        variable: VariableId,
    },

    #[error("architecture {architecture}: {from} cannot be delivered as {to}")]
    IncompatibleRoute {
        architecture: String,
        from: EventType,
        to: EventType,
    },

    #[error("architecture {architecture}: import {import} bound to more than one exporter")]
    DuplicateExporter {
        architecture: String,
        import: VariableId,
    },
}

/// Misuse of a continuous variable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error("{variable}: update at {at} precedes last sample at {last}")]
    NonMonotonicUpdate {
        variable: VariableId,
        last: SimTime,
        at: SimTime,
    },

    #[error("{0} read before initialisation")]
    Uninitialised(VariableId),

    #[error("{0} is imported but bound to no exporter")]
    Unbound(VariableId),

    #[error("{0} is not declared")]
    Unknown(VariableId),
}

/// Fatal simulation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Architecture(#[from] ArchitectureError),

    #[error("precondition violated in {model}: {message}")]
    Precondition { model: ModelUri, message: String },

    #[error("fixpoint initialisation deadlocked, still blocked: {}", format_blocked(.blocked))]
    FixpointDeadlock { blocked: BTreeSet<VariableId> },

    #[error("{0} simulation is not implemented")]
    UnimplementedMode(SimulationMode),

    #[error("variable error: {0}")]
    Variable(#[from] VariableError),

    #[error("invalid real-time clock: {0}")]
    InvalidClock(String),

    #[error("run aborted: {0}")]
    RunAborted(String),
}

impl SimError {
    /// Builds a precondition violation raised by `model`.
    pub fn precondition(model: &ModelUri, message: impl Into<String>) -> Self {
        SimError::Precondition {
            model: model.clone(),
            message: message.into(),
        }
    }
}

fn format_blocked(blocked: &BTreeSet<VariableId>) -> String {
    blocked
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
