#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use ralph::store::TaskRecord;
use ralph::types::{TaskId, TaskStatus};

/// Builder for `TaskRecord` to simplify test setup.
///
/// Defaults to a `running` record started just now, with a fake pid and its
/// log under the system temp directory.
pub struct TaskRecordBuilder {
    record: TaskRecord,
}

impl TaskRecordBuilder {
    pub fn new(seq: u64) -> Self {
        let id = TaskId::from_seq(seq);
        let tmp = std::env::temp_dir();
        Self {
            record: TaskRecord {
                output_path: tmp.join(format!("{id}.log")),
                id,
                name: "task".to_string(),
                command: "true".to_string(),
                pid: 40_000 + seq as u32,
                pid_start_ticks: Some(1_000),
                cwd: tmp,
                start_time: Utc::now(),
                timeout_seconds: None,
                status: TaskStatus::Running,
                exit_code: None,
                end_time: None,
                probe_error: None,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.record.name = name.to_string();
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.record.command = command.to_string();
        self
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.record.pid = pid;
        self
    }

    pub fn start_ticks(mut self, ticks: Option<u64>) -> Self {
        self.record.pid_start_ticks = ticks;
        self
    }

    pub fn started_secs_ago(mut self, secs: i64) -> Self {
        self.record.start_time = Utc::now() - Duration::seconds(secs);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.record.timeout_seconds = Some(secs);
        self
    }

    /// Put the log (and therefore the exit sentinel) in `logs_dir`.
    pub fn logs_in(mut self, logs_dir: &Path) -> Self {
        self.record.output_path = logs_dir.join(format!("{}.log", self.record.id));
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.record.output_path = path.into();
        self
    }

    /// Make the record terminal, ended `secs_ago` seconds before now.
    pub fn finished(mut self, status: TaskStatus, exit_code: i32, secs_ago: i64) -> Self {
        self.record.status = status;
        self.record.exit_code = Some(exit_code);
        self.record.end_time = Some(Utc::now() - Duration::seconds(secs_ago));
        self
    }

    pub fn build(self) -> TaskRecord {
        self.record
    }
}
