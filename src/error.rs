//! Error types for blocksmith.
//!
//! Plumbing code returns `anyhow::Result`; the variants below name the
//! conditions that end a run, so `main` can map them to exit codes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlocksmithError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Another run is already in progress (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("No feed could be fetched ({attempted} attempted)")]
    NoFeeds { attempted: usize },

    #[error("Safety brake: only {found} entries (threshold: {threshold}), keeping current ruleset")]
    SafetyBrake { found: usize, threshold: usize },

    #[error("Ruleset syntax check failed: {0}")]
    SyntaxCheck(String),

    #[error("Failed to apply ruleset: {0}")]
    Apply(String),
}

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const RUN_FAILED: u8 = 1;
    pub const ENVIRONMENT: u8 = 2;
    pub const LOCKED: u8 = 3;
}

impl BlocksmithError {
    /// Exit code reported to the scheduler for this condition.
    pub fn exit_code(&self) -> u8 {
        match self {
            BlocksmithError::Config(_) | BlocksmithError::Permission(_) => exit_code::ENVIRONMENT,
            BlocksmithError::AlreadyRunning { .. } => exit_code::LOCKED,
            BlocksmithError::NoFeeds { .. }
            | BlocksmithError::SafetyBrake { .. }
            | BlocksmithError::SyntaxCheck(_)
            | BlocksmithError::Apply(_) => exit_code::RUN_FAILED,
        }
    }
}

/// Pick the exit code for an error bubbling out of a command.
///
/// Errors that are not a [`BlocksmithError`] are I/O or setup failures.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<BlocksmithError>()
        .map(BlocksmithError::exit_code)
        .unwrap_or(exit_code::ENVIRONMENT)
}
