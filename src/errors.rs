// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum RalphError {
    /// The command could not be started. No record is created for it.
    #[error("Launch error: could not start `{command}`: {reason}")]
    Launch { command: String, reason: String },

    /// The persisted task table could not be parsed. Never auto-repaired.
    #[error("Corrupt task store at {path:?}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task {0} is not running")]
    NotRunning(TaskId),

    /// The process group survived SIGKILL. Reported as a warning.
    #[error("Task {id} (pid {pid}) still alive {grace:?} after SIGKILL")]
    TimeoutKill {
        id: TaskId,
        pid: u32,
        grace: Duration,
    },

    /// Reconciliation of a single record failed; its status is left as-is.
    #[error("Could not reconcile task {id}: {reason}")]
    Probe { id: TaskId, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RalphError {
    pub fn launch(command: &str, reason: impl ToString) -> Self {
        RalphError::Launch {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RalphError>;
