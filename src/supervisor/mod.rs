// src/supervisor/mod.rs

//! The operations behind each CLI action.
//!
//! [`Supervisor`] ties the task store, a [`ProcessProbe`] and the resolved
//! configuration together. Every mutating operation runs inside one store
//! transaction, so concurrent invocations see either the state before it or
//! the state after it.
//!
//! - [`reconcile`]: re-derive real status from sentinels and the OS.
//! - [`timeout`]: stop overdue tasks; also used by [`Supervisor::kill`].
//! - [`output`]: read, tail and follow task logs.
//! - [`retention`]: sweep old terminal records.

pub mod output;
pub mod reconcile;
pub mod retention;
pub mod timeout;

use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{RalphError, Result};
use crate::exec::{LaunchRequest, launch};
use crate::process::ProcessProbe;
use crate::store::{TaskRecord, TaskStore};
use crate::types::{TaskId, TaskStatus};

/// Transitions and per-record problems from one pass over the table.
#[derive(Debug, Default)]
pub struct Report {
    pub transitions: Vec<(TaskId, TaskStatus)>,
    /// Problems that did not stop the pass (probe failures, kill warnings).
    pub warnings: Vec<RalphError>,
}

impl Report {
    pub fn merge(&mut self, other: Report) {
        self.transitions.extend(other.transitions);
        self.warnings.extend(other.warnings);
    }
}

/// Records after a status pass, plus what happened during it.
#[derive(Debug)]
pub struct StatusReport {
    pub records: Vec<TaskRecord>,
    pub report: Report,
}

/// Outcome of `--clean`.
#[derive(Debug)]
pub struct CleanReport {
    pub removed: Vec<TaskId>,
    pub warnings: Vec<RalphError>,
}

pub struct Supervisor<P: ProcessProbe> {
    store: TaskStore,
    probe: P,
    config: ConfigFile,
}

impl<P: ProcessProbe> Supervisor<P> {
    pub fn new(store: TaskStore, probe: P, config: ConfigFile) -> Self {
        Self {
            store,
            probe,
            config,
        }
    }

    /// Open the store named by `config.state_dir`.
    pub fn from_config(config: ConfigFile, probe: P) -> Result<Self> {
        let store = TaskStore::open(&config.state_dir)?;
        Ok(Self::new(store, probe, config))
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Launch a task. The configured default timeout applies when the
    /// request has none; a timeout of `0` disables it.
    pub fn launch(&self, req: LaunchRequest) -> Result<TaskRecord> {
        let timeout = self.config.effective_timeout(req.timeout_seconds);
        launch(&self.store, &self.probe, req.timeout(timeout))
    }

    /// Reconcile every running record, enforce timeouts, and return the table.
    pub async fn status(&self) -> Result<StatusReport> {
        let mut tx = self.store.begin()?;
        let now = Utc::now();

        let mut report = reconcile::reconcile_all(tx.table_mut(), &self.probe, now);
        let enforced =
            timeout::enforce_timeouts(tx.table_mut(), &self.probe, self.config.kill_grace, now)
                .await;
        report.merge(enforced);

        let records = tx.table().tasks.clone();
        tx.commit()?;

        debug!(
            tasks = records.len(),
            transitions = report.transitions.len(),
            warnings = report.warnings.len(),
            "status pass complete"
        );
        Ok(StatusReport { records, report })
    }

    /// Like [`Supervisor::status`] for a single record.
    pub async fn check(&self, id: &TaskId) -> Result<(TaskRecord, Report)> {
        let mut tx = self.store.begin()?;
        let now = Utc::now();
        let record = tx
            .table_mut()
            .get_mut(id)
            .ok_or_else(|| RalphError::NotFound(id.clone()))?;

        let mut report = Report::default();
        match reconcile::reconcile_record(record, &self.probe, now) {
            Ok(Some(status)) => report.transitions.push((id.clone(), status)),
            Ok(None) => {}
            Err(e) => report.warnings.push(e),
        }
        // A record that failed reconciliation has an unverified pid.
        if record.probe_error.is_none() && record.is_overdue(now) {
            timeout::stop_task(
                record,
                &self.probe,
                self.config.kill_grace,
                TaskStatus::TimedOut,
                &mut report,
            )
            .await;
        }

        let record = record.clone();
        tx.commit()?;
        Ok((record, report))
    }

    /// Terminate a running task and mark it `killed`.
    ///
    /// Fails with [`RalphError::NotRunning`] if reconciliation shows the task
    /// already reached a terminal state.
    pub async fn kill(&self, id: &TaskId) -> Result<(TaskRecord, Report)> {
        let mut tx = self.store.begin()?;
        let record = tx
            .table_mut()
            .get_mut(id)
            .ok_or_else(|| RalphError::NotFound(id.clone()))?;

        if let Err(e) = reconcile::reconcile_record(record, &self.probe, Utc::now()) {
            // Status unknown; refusing is safer than signalling a pid we
            // could not vouch for.
            tx.commit()?;
            return Err(e);
        }
        if !record.is_running() {
            tx.commit()?;
            return Err(RalphError::NotRunning(id.clone()));
        }

        let mut report = Report::default();
        timeout::stop_task(
            record,
            &self.probe,
            self.config.kill_grace,
            TaskStatus::Killed,
            &mut report,
        )
        .await;

        let record = record.clone();
        tx.commit()?;
        Ok((record, report))
    }

    /// Captured output of `id`, optionally only the last `tail` lines.
    pub fn output(&self, id: &TaskId, tail: Option<usize>) -> Result<Vec<u8>> {
        let record = self.find(id)?;
        output::read_output(&record, tail)
    }

    /// Print output of `id` to `out`, then follow it while the task runs.
    pub async fn follow<W>(&self, id: &TaskId, tail: Option<usize>, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let record = self.find(id)?;
        output::follow_output(&record, &self.probe, tail, out).await
    }

    /// Reconcile, then remove terminal records that ended more than
    /// `older_than` (default: the configured retention) ago.
    pub fn clean(&self, older_than: Option<Duration>) -> Result<CleanReport> {
        let retention = older_than.unwrap_or(self.config.retention);
        self.store.transaction(|table| {
            let now = Utc::now();
            let reconciled = reconcile::reconcile_all(table, &self.probe, now);
            let outcome = retention::sweep(table, retention::cutoff(now, retention));

            let mut warnings = reconciled.warnings;
            warnings.extend(outcome.failures);
            Ok(CleanReport {
                removed: outcome.removed,
                warnings,
            })
        })
    }

    fn find(&self, id: &TaskId) -> Result<TaskRecord> {
        self.store
            .load_table()?
            .get(id)
            .cloned()
            .ok_or_else(|| RalphError::NotFound(id.clone()))
    }
}
