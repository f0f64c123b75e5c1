// src/exec/launcher.rs

//! Starts tasks as detached processes.

use std::fs::{self, File, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::{RalphError, Result};
use crate::exec::preflight::check_command;
use crate::exec::sentinel::{WRAPPER_ARGV0, WRAPPER_SCRIPT};
use crate::process::{ProcessProbe, ProcessState};
use crate::store::{TaskRecord, TaskStore, sentinel_path_for};
use crate::types::{TaskId, TaskStatus};

/// What to launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub command: String,
    pub name: String,
    pub timeout_seconds: Option<u64>,
    /// Defaults to the current working directory.
    pub cwd: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            name: "task".to_string(),
            timeout_seconds: None,
            cwd: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Launch `req` and record it as `running`.
///
/// The child leads its own session, so it keeps running after this process
/// exits. Its combined output is appended to the task log, which exists
/// before the child is spawned. On any failure to start, nothing is recorded
/// and [`RalphError::Launch`] is returned.
pub fn launch(store: &TaskStore, probe: &dyn ProcessProbe, req: LaunchRequest) -> Result<TaskRecord> {
    let cwd = match req.cwd.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let cwd = fs::canonicalize(&cwd)
        .map_err(|e| RalphError::launch(&req.command, format!("working directory {:?}: {e}", cwd)))?;

    check_command(&req.command, &cwd).map_err(|r| RalphError::launch(&req.command, r))?;

    let id = store.allocate_id()?;
    let output_path = absolute(&store.log_path(&id))?;
    let sentinel = sentinel_path_for(&output_path);

    let log = create_log(&output_path)?;

    let pid = match spawn_detached(&req.command, &cwd, &log, &sentinel) {
        Ok(pid) => pid,
        Err(e) => {
            discard_log(&id, &output_path);
            return Err(RalphError::launch(&req.command, e));
        }
    };

    let pid_start_ticks = match probe.inspect(pid) {
        Ok(ProcessState::Alive { start_ticks }) => start_ticks,
        Ok(other) => {
            // Very short commands can be gone already; the sentinel will
            // carry the outcome.
            debug!(task = %id, pid, state = ?other, "task exited before identity capture");
            None
        }
        Err(e) => {
            warn!(task = %id, pid, error = %e, "could not capture process start time");
            None
        }
    };

    let record = TaskRecord {
        id: id.clone(),
        name: req.name,
        command: req.command,
        pid,
        pid_start_ticks,
        cwd,
        start_time: Utc::now(),
        timeout_seconds: req.timeout_seconds,
        status: TaskStatus::Running,
        exit_code: None,
        output_path,
        end_time: None,
        probe_error: None,
    };

    store.append(record.clone())?;

    info!(
        task = %record.id,
        name = %record.name,
        pid,
        cmd = %record.command,
        timeout = ?record.timeout_seconds,
        "launched task"
    );

    Ok(record)
}

fn create_log(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("creating output log {:?}", path))?;
    Ok(file)
}

fn discard_log(id: &TaskId, path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(task = %id, path = ?path, error = %e, "failed to remove log of unlaunched task");
    }
}

/// Spawn the sentinel wrapper in a new session with stdout and stderr both
/// appending to `log`. Returns the session leader's pid.
fn spawn_detached(command: &str, cwd: &Path, log: &File, sentinel: &Path) -> std::io::Result<u32> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(WRAPPER_SCRIPT)
        .arg(WRAPPER_ARGV0)
        .arg(command)
        .arg(sentinel)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?));

    // SAFETY: setsid(2) is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    let child = cmd.spawn()?;
    // Dropping `Child` neither waits nor kills; the task outlives us.
    Ok(child.id())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(cwd.join(path))
}
