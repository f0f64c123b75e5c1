// src/store/record.rs

//! Persisted task metadata.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, TaskStatus};

/// Exit code recorded when a task vanished without its wrapper writing one.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// One launched task.
///
/// Everything except `status`, `exit_code`, `end_time` and `probe_error` is
/// fixed at launch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub command: String,

    /// Pid of the session leader spawned for this task. Kept for audit after
    /// the process has exited.
    pub pid: u32,

    /// Kernel start time of `pid` at launch, used to detect pid reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_start_ticks: Option<u64>,

    pub cwd: PathBuf,
    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    pub status: TaskStatus,

    #[serde(default)]
    pub exit_code: Option<i32>,

    pub output_path: PathBuf,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Set when the last reconciliation of this record failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

impl TaskRecord {
    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Exit-code sentinel written beside the output log.
    pub fn sentinel_path(&self) -> PathBuf {
        sentinel_path_for(&self.output_path)
    }

    /// True when the task is still running past its timeout at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match (self.is_running(), self.timeout_seconds) {
            (true, Some(secs)) => {
                // A limit chrono cannot represent never elapses.
                match i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds) {
                    Some(limit) => now.signed_duration_since(self.start_time) > limit,
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Move a running record into a terminal state.
    ///
    /// Terminal states are write-once: returns `false` and leaves the record
    /// untouched if it is already terminal or `status` is not terminal.
    pub fn finish(&mut self, status: TaskStatus, exit_code: i32, at: DateTime<Utc>) -> bool {
        if !self.is_running() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = Some(exit_code);
        self.end_time = Some(at);
        self.probe_error = None;
        true
    }

    /// True for terminal records whose `end_time` is strictly older than `cutoff`.
    pub fn ended_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.end_time.is_some_and(|end| end < cutoff)
    }
}

/// `<logs>/<id>.log` becomes `<logs>/<id>.exit`.
pub fn sentinel_path_for(output_path: &Path) -> PathBuf {
    output_path.with_extension("exit")
}

/// The full persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTable {
    /// Next sequence number to hand out. Never decremented.
    pub next_id: u64,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            tasks: Vec::new(),
        }
    }
}

impl TaskTable {
    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::from_seq(self.next_id);
        self.next_id += 1;
        id
    }
}
