use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable cross-invocation handle for a task, e.g. `ralph_0007`.
///
/// Ids are derived from the store's monotonic counter and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub const PREFIX: &'static str = "ralph_";

    pub fn from_seq(seq: u64) -> Self {
        TaskId(format!("{}{:04}", Self::PREFIX, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.trim().to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId::from(s.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `Running` moves to exactly one of the terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Killed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// Organic terminal state for a process that exited with `code`.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "timed_out" => Ok(TaskStatus::TimedOut),
            "killed" => Ok(TaskStatus::Killed),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}
