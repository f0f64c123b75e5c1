// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! The surface is flag-style (`--run`, `--status`, ...) because other tools
//! already script against it. Exactly one action flag is accepted per
//! invocation.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `ralph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ralph",
    version,
    about = "Run long commands in the background and check on them later.",
    long_about = None
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["run", "status", "check", "output", "kill", "clean"])
))]
pub struct CliArgs {
    /// Start COMMAND in the background and print its task id.
    #[arg(long, value_name = "COMMAND")]
    pub run: Option<String>,

    /// Display label for `--run`.
    #[arg(long, value_name = "NAME", requires = "run")]
    pub name: Option<String>,

    /// Kill the task after this many seconds (0 disables). Overrides
    /// `[ralph].default_timeout`.
    #[arg(long, value_name = "SECONDS", requires = "run")]
    pub timeout: Option<u64>,

    /// Working directory for `--run` (default: current directory).
    #[arg(long, value_name = "DIR", requires = "run")]
    pub cwd: Option<PathBuf>,

    /// Reconcile all tasks and print the table.
    #[arg(long)]
    pub status: bool,

    /// Reconcile one task and print it.
    #[arg(long, value_name = "ID")]
    pub check: Option<String>,

    /// Print JSON instead of the table (`--status`, `--check`).
    #[arg(long)]
    pub json: bool,

    /// Print the captured output of a task.
    #[arg(long, value_name = "ID")]
    pub output: Option<String>,

    /// Only print the last N lines of output.
    #[arg(long, value_name = "N", requires = "output")]
    pub tail: Option<usize>,

    /// Keep printing new output until the task stops.
    #[arg(long, requires = "output")]
    pub follow: bool,

    /// Stop a running task (SIGTERM, then SIGKILL after the grace period).
    #[arg(long, value_name = "ID")]
    pub kill: Option<String>,

    /// Remove finished tasks older than the retention period.
    #[arg(long)]
    pub clean: bool,

    /// Retention override for `--clean`, e.g. `1h` or `0s`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg, requires = "clean")]
    pub older_than: Option<Duration>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Ralph.toml` in the current directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State directory (overrides config and `RALPH_STATE_DIR`).
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RALPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// The action selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run {
        command: String,
        name: String,
        timeout: Option<u64>,
        cwd: Option<PathBuf>,
    },
    Status {
        json: bool,
    },
    Check {
        id: String,
        json: bool,
    },
    Output {
        id: String,
        tail: Option<usize>,
        follow: bool,
    },
    Kill {
        id: String,
    },
    Clean {
        older_than: Option<Duration>,
    },
}

impl CliArgs {
    /// Collapse the flag soup into one [`Action`].
    ///
    /// clap's `action` group guarantees exactly one action flag is present.
    pub fn action(&self) -> Action {
        if let Some(command) = &self.run {
            Action::Run {
                command: command.clone(),
                name: self.name.clone().unwrap_or_else(|| "task".to_string()),
                timeout: self.timeout,
                cwd: self.cwd.clone(),
            }
        } else if let Some(id) = &self.check {
            Action::Check {
                id: id.clone(),
                json: self.json,
            }
        } else if let Some(id) = &self.output {
            Action::Output {
                id: id.clone(),
                tail: self.tail,
                follow: self.follow,
            }
        } else if let Some(id) = &self.kill {
            Action::Kill { id: id.clone() }
        } else if self.clean {
            Action::Clean {
                older_than: self.older_than,
            }
        } else {
            Action::Status { json: self.json }
        }
    }
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
