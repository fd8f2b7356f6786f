//! Output of finished runs.

pub mod export;
