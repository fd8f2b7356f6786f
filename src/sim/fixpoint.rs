//! Iterative resolution of mutually dependent variable initial values.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::SimError;

use super::types::VariableId;

/// Bookkeeping of one initialisation pass over every model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassResult {
    /// Variables initialised during the pass.
    pub initialised: usize,
    /// Variables still waiting on an uninitialised import.
    pub blocked: BTreeSet<VariableId>,
}

impl PassResult {
    pub fn record(&mut self, initialised: usize, blocked: impl IntoIterator<Item = VariableId>) {
        self.initialised += initialised;
        self.blocked.extend(blocked);
    }
}

/// Terminal state of the fixpoint loop.
#[derive(Debug, Clone, PartialEq)]
pub enum FixpointOutcome {
    /// Every variable initialised after `passes` passes.
    Resolved { passes: usize },
    /// A pass made no progress while variables remained blocked.
    Deadlocked(BTreeSet<VariableId>),
}

/// Repeats initialisation passes until nothing is blocked or a pass makes
/// no progress.
///
/// A pass that initialises nothing and reports nothing blocked resolves
/// immediately, so an architecture without continuous variables resolves
/// in one pass.
///
/// # Errors
///
/// Propagates any error raised by `pass`.
pub fn solve<F>(mut pass: F) -> Result<FixpointOutcome, SimError>
where
    F: FnMut(usize) -> Result<PassResult, SimError>,
{
    let mut passes = 0;
    loop {
        passes += 1;
        let result = pass(passes)?;
        debug!(
            pass = passes,
            initialised = result.initialised,
            blocked = result.blocked.len(),
            "fixpoint pass"
        );
        if result.blocked.is_empty() {
            info!(passes, "variables initialised");
            return Ok(FixpointOutcome::Resolved { passes });
        }
        if result.initialised == 0 {
            return Ok(FixpointOutcome::Deadlocked(result.blocked));
        }
    }
}

/// Like [`solve`], but maps a deadlock to [`SimError::FixpointDeadlock`].
///
/// # Errors
///
/// Returns [`SimError::FixpointDeadlock`] with the blocked set, or any
/// error raised by `pass`.
pub fn resolve<F>(pass: F) -> Result<usize, SimError>
where
    F: FnMut(usize) -> Result<PassResult, SimError>,
{
    match solve(pass)? {
        FixpointOutcome::Resolved { passes } => Ok(passes),
        FixpointOutcome::Deadlocked(blocked) => Err(SimError::FixpointDeadlock { blocked }),
    }
}
