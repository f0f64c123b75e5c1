// src/supervisor/retention.rs

//! Sweeping old terminal records and their files.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::RalphError;
use crate::store::{TaskRecord, TaskTable};
use crate::types::TaskId;

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub removed: Vec<TaskId>,
    /// Records kept because their files could not be deleted.
    pub failures: Vec<RalphError>,
}

/// Cutoff for `retention` measured back from `now`.
pub fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whether `record` is eligible for removal. Running records never are.
pub fn is_expired(record: &TaskRecord, cutoff: DateTime<Utc>) -> bool {
    record.ended_before(cutoff)
}

/// Remove every terminal record that ended before `cutoff`, along with its
/// log and exit sentinel.
///
/// A record is only dropped from the table once its files are gone (or were
/// already missing).
pub fn sweep(table: &mut TaskTable, cutoff: DateTime<Utc>) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();

    table.tasks.retain(|record| {
        if !is_expired(record, cutoff) {
            return true;
        }
        match remove_files(record) {
            Ok(()) => {
                info!(task = %record.id, status = %record.status, "swept task");
                outcome.removed.push(record.id.clone());
                false
            }
            Err(e) => {
                warn!(task = %record.id, error = %e, "could not remove task files; keeping record");
                outcome.failures.push(RalphError::IoError(e));
                true
            }
        }
    });

    outcome
}

fn remove_files(record: &TaskRecord) -> std::io::Result<()> {
    remove_if_present(&record.output_path)?;
    remove_if_present(&record.sentinel_path())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(std::io::Error::new(
            e.kind(),
            format!("removing {}: {e}", path.display()),
        )),
    }
}
