// src/supervisor/timeout.rs

//! Terminating tasks that outlived their timeout, and the manual kill path
//! that shares the same termination sequence.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::RalphError;
use crate::exec::read_exit_code;
use crate::process::{ProcessProbe, terminate_group};
use crate::store::{TaskRecord, TaskTable, UNKNOWN_EXIT_CODE};
use crate::supervisor::Report;
use crate::types::TaskStatus;

/// Stop every running record that is past its timeout at `now` and mark it
/// `timed_out`.
///
/// Call after reconciliation, inside the same store transaction, so a task
/// that already finished on its own keeps its organic status. Records whose
/// reconciliation failed in that pass are left alone: their pid could not be
/// vouched for.
pub async fn enforce_timeouts(
    table: &mut TaskTable,
    probe: &dyn ProcessProbe,
    grace: Duration,
    now: DateTime<Utc>,
) -> Report {
    let mut report = Report::default();

    for record in table
        .tasks
        .iter_mut()
        .filter(|r| r.is_overdue(now) && r.probe_error.is_none())
    {
        info!(
            task = %record.id,
            pid = record.pid,
            timeout = ?record.timeout_seconds,
            "task exceeded its timeout"
        );
        stop_task(record, probe, grace, TaskStatus::TimedOut, &mut report).await;
    }

    report
}

/// Terminate a running record's process group and move it to `status`
/// (`timed_out` or `killed`).
///
/// - If the exit sentinel shows up before any signal is sent, the organic
///   outcome is recorded instead.
/// - If the group is gone before SIGTERM, the record gets what reconciliation
///   would give it: the sentinel's outcome, or `killed` with exit code -1.
/// - A signalling failure leaves the record running with `probe_error` set.
/// - A process that survives SIGKILL is still marked `status`, with a
///   [`RalphError::TimeoutKill`] warning.
pub(crate) async fn stop_task(
    record: &mut TaskRecord,
    probe: &dyn ProcessProbe,
    grace: Duration,
    status: TaskStatus,
    report: &mut Report,
) {
    match read_exit_code(&record.sentinel_path()) {
        Ok(Some(code)) => {
            let organic = TaskStatus::from_exit_code(code);
            if record.finish(organic, code, Utc::now()) {
                info!(task = %record.id, status = %organic, "task finished before it could be stopped");
                report.transitions.push((record.id.clone(), organic));
            }
            return;
        }
        Ok(None) => {}
        Err(e) => {
            flag(record, format!("{e:#}"), report);
            return;
        }
    }

    let termination = match terminate_group(probe, record.pid, grace).await {
        Ok(t) => t,
        Err(e) => {
            flag(record, format!("{e:#}"), report);
            return;
        }
    };

    // Nothing was signalled: the group went away on its own just now. Record
    // it the way reconciliation would.
    if termination.signal.is_none() {
        let (observed, code) = match read_exit_code(&record.sentinel_path()) {
            Ok(Some(code)) => (TaskStatus::from_exit_code(code), code),
            _ => (TaskStatus::Killed, UNKNOWN_EXIT_CODE),
        };
        if record.finish(observed, code, Utc::now()) {
            info!(task = %record.id, status = %observed, "task exited before it could be stopped");
            report.transitions.push((record.id.clone(), observed));
        }
        return;
    }

    let code = termination.exit_code().unwrap_or(UNKNOWN_EXIT_CODE);
    if record.finish(status, code, Utc::now()) {
        report.transitions.push((record.id.clone(), status));
    }

    if termination.survived {
        warn!(task = %record.id, pid = record.pid, "process survived SIGKILL");
        report.warnings.push(RalphError::TimeoutKill {
            id: record.id.clone(),
            pid: record.pid,
            grace,
        });
    }
}

fn flag(record: &mut TaskRecord, reason: String, report: &mut Report) {
    warn!(task = %record.id, pid = record.pid, error = %reason, "could not stop task");
    record.probe_error = Some(reason.clone());
    report.warnings.push(RalphError::Probe {
        id: record.id.clone(),
        reason,
    });
}
