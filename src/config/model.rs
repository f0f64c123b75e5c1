// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default tool-managed directory, relative to the working directory.
pub const DEFAULT_STATE_DIR: &str = ".ralph";
/// Terminal records older than this are swept by `--clean`.
pub const DEFAULT_RETENTION: &str = "24h";
/// Time between SIGTERM and SIGKILL when terminating a task.
pub const DEFAULT_KILL_GRACE: &str = "2s";

/// Configuration as read from a TOML file.
///
/// ```toml
/// [ralph]
/// state_dir = ".ralph"
/// default_timeout = 300
/// retention = "24h"
/// kill_grace = "2s"
/// ```
///
/// Every key is optional. Convert into a [`ConfigFile`] with `try_from`,
/// which parses durations and rejects nonsensical values.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub ralph: RalphSection,
}

/// `[ralph]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RalphSection {
    /// Directory holding the task table, lock file and logs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Timeout in seconds applied when `--timeout` is not given.
    ///
    /// `None` or `0` means tasks run without a timeout.
    #[serde(default)]
    pub default_timeout: Option<u64>,

    /// Duration string such as `"24h"` or `"90m"`.
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Duration string such as `"2s"` or `"500ms"`.
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_retention() -> String {
    DEFAULT_RETENTION.to_string()
}

fn default_kill_grace() -> String {
    DEFAULT_KILL_GRACE.to_string()
}

impl Default for RalphSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_timeout: None,
            retention: default_retention(),
            kill_grace: default_kill_grace(),
        }
    }
}

/// Validated configuration used by the rest of the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub state_dir: PathBuf,
    pub default_timeout: Option<u64>,
    pub retention: Duration,
    pub kill_grace: Duration,
}

impl ConfigFile {
    /// Effective timeout for a launch: the CLI value wins, `0` disables.
    pub fn effective_timeout(&self, requested: Option<u64>) -> Option<u64> {
        requested
            .or(self.default_timeout)
            .filter(|secs| *secs > 0)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_timeout: None,
            retention: Duration::from_secs(24 * 60 * 60),
            kill_grace: Duration::from_secs(2),
        }
    }
}
