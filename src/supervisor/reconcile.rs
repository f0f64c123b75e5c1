// src/supervisor/reconcile.rs

//! Re-deriving the real status of `running` records from the OS.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::RalphError;
use crate::exec::read_exit_code;
use crate::process::{ProcessProbe, ProcessState};
use crate::store::{TaskRecord, TaskTable, UNKNOWN_EXIT_CODE};
use crate::supervisor::Report;
use crate::types::TaskStatus;

/// What the sentinel and the probe say about a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Running,
    /// The wrapper recorded this exit code.
    Exited(i32),
    /// The process is gone and left no exit code (killed from outside).
    Vanished,
}

/// Look at the sentinel first, then the process itself.
///
/// A live pid only counts as our task when its start time matches the one
/// captured at launch; a recycled pid or a zombie is treated as gone. The
/// sentinel is read again after the probe because the task may have finished
/// in between.
pub fn observe(record: &TaskRecord, probe: &dyn ProcessProbe) -> Result<Observation> {
    let sentinel = record.sentinel_path();
    if let Some(code) = read_exit_code(&sentinel)? {
        return Ok(Observation::Exited(code));
    }

    let state = probe.inspect(record.pid)?;
    if state.is_same_process(record.pid_start_ticks) {
        return Ok(Observation::Running);
    }

    if matches!(state, ProcessState::Alive { .. } | ProcessState::Foreign) {
        debug!(task = %record.id, pid = record.pid, ?state, "pid now belongs to another process");
    }

    Ok(match read_exit_code(&sentinel)? {
        Some(code) => Observation::Exited(code),
        None => Observation::Vanished,
    })
}

/// Reconcile one record. Terminal records are left alone.
///
/// Returns the new status if the record transitioned. On a probe failure the
/// status is kept, `probe_error` is set, and a [`RalphError::Probe`] is
/// returned for reporting.
pub fn reconcile_record(
    record: &mut TaskRecord,
    probe: &dyn ProcessProbe,
    now: DateTime<Utc>,
) -> std::result::Result<Option<TaskStatus>, RalphError> {
    if !record.is_running() {
        return Ok(None);
    }

    let (status, code) = match observe(record, probe) {
        Ok(Observation::Running) => {
            record.probe_error = None;
            return Ok(None);
        }
        Ok(Observation::Exited(code)) => (TaskStatus::from_exit_code(code), code),
        Ok(Observation::Vanished) => (TaskStatus::Killed, UNKNOWN_EXIT_CODE),
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(task = %record.id, pid = record.pid, error = %reason, "reconciliation failed");
            record.probe_error = Some(reason.clone());
            return Err(RalphError::Probe {
                id: record.id.clone(),
                reason,
            });
        }
    };

    record.finish(status, code, now);
    info!(task = %record.id, %status, exit_code = code, "task finished");
    Ok(Some(status))
}

/// Reconcile every running record. A failure on one record never stops the
/// others.
pub fn reconcile_all(table: &mut TaskTable, probe: &dyn ProcessProbe, now: DateTime<Utc>) -> Report {
    let mut report = Report::default();
    for record in table.tasks.iter_mut().filter(|r| r.is_running()) {
        match reconcile_record(record, probe, now) {
            Ok(Some(status)) => report.transitions.push((record.id.clone(), status)),
            Ok(None) => {}
            Err(e) => report.warnings.push(e),
        }
    }
    report
}
