// src/store/mod.rs

//! File-backed task table shared by every invocation.
//!
//! Layout under the state directory:
//!
//! - `tasks.json`: the full table, replaced atomically on every save
//! - `tasks.lock`: advisory lock file (see [`lock`])
//! - `logs/`: per-task output logs and exit sentinels
//!
//! Every read-modify-write runs under an exclusive lock so two invocations
//! never interleave a load/save pair. Reads take a shared lock.

pub mod lock;
pub mod record;

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{RalphError, Result};
use crate::types::TaskId;

pub use lock::StoreLock;
pub use record::{TaskRecord, TaskTable, UNKNOWN_EXIT_CODE, sentinel_path_for};

const TABLE_FILE: &str = "tasks.json";
const LOCK_FILE: &str = "tasks.lock";
const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let logs = dir.join(LOGS_DIR);
        fs::create_dir_all(&logs)
            .with_context(|| format!("creating state directory {:?}", logs))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self) -> PathBuf {
        self.dir.join(TABLE_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join(LOGS_DIR)
    }

    /// Where the output log for `id` lives.
    pub fn log_path(&self, id: &TaskId) -> PathBuf {
        self.logs_dir().join(format!("{id}.log"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// All records, in launch order.
    pub fn load(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.load_table()?.tasks)
    }

    /// The whole table, under a shared lock.
    pub fn load_table(&self) -> Result<TaskTable> {
        let _lock = StoreLock::shared(&self.lock_path())?;
        self.read_table()
    }

    /// Replace every record. `next_id` is preserved.
    pub fn save(&self, records: Vec<TaskRecord>) -> Result<()> {
        self.transaction(|table| {
            table.tasks = records;
            Ok(())
        })
    }

    /// Add a freshly launched record. Its id must not already be present.
    pub fn append(&self, record: TaskRecord) -> Result<()> {
        self.transaction(|table| {
            if table.get(&record.id).is_some() {
                return Err(RalphError::Other(anyhow::anyhow!(
                    "task {} already exists in the store",
                    record.id
                )));
            }
            table.tasks.push(record);
            Ok(())
        })
    }

    /// Apply `mutation` to record `id` and return the updated copy.
    pub fn update<F>(&self, id: &TaskId, mutation: F) -> Result<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        self.transaction(|table| {
            let record = table
                .get_mut(id)
                .ok_or_else(|| RalphError::NotFound(id.clone()))?;
            mutation(record);
            Ok(record.clone())
        })
    }

    /// Reserve a fresh id. The counter is persisted immediately, so the id is
    /// burned even if the launch that asked for it fails.
    pub fn allocate_id(&self) -> Result<TaskId> {
        self.transaction(|table| Ok(table.allocate_id()))
    }

    /// Run `f` against the table under the exclusive lock.
    ///
    /// The table is written back only when `f` succeeds and actually changed
    /// something. An error from `f` leaves the persisted table untouched.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TaskTable) -> Result<T>,
    {
        let mut tx = self.begin()?;
        let out = f(tx.table_mut())?;
        tx.commit()?;
        Ok(out)
    }

    /// Take the exclusive lock and load the table for a longer
    /// read-modify-write (e.g. one that awaits a kill grace period).
    ///
    /// Dropping the returned [`Transaction`] without committing discards the
    /// changes and releases the lock.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let lock = StoreLock::exclusive(&self.lock_path())?;
        let original = self.read_table()?;
        let table = original.clone();
        Ok(Transaction {
            store: self,
            _lock: lock,
            original,
            table,
        })
    }

    fn read_table(&self) -> Result<TaskTable> {
        let path = self.table_path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TaskTable::default()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map_err(|e| RalphError::CorruptStore {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Serialize to a temp file in the same directory, fsync, then rename over
    /// the table so readers only ever see a complete file.
    fn write_table(&self, table: &TaskTable) -> Result<()> {
        let path = self.table_path();
        let tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {:?}", self.dir))?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, table)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing task table at {:?}", path))?;

        debug!(path = ?path, tasks = table.tasks.len(), "saved task table");
        Ok(())
    }
}

/// An open read-modify-write on the task table. Holds the exclusive lock.
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a TaskStore,
    _lock: StoreLock,
    original: TaskTable,
    table: TaskTable,
}

impl Transaction<'_> {
    pub fn table(&self) -> &TaskTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TaskTable {
        &mut self.table
    }

    /// Persist the table if it changed, then release the lock.
    pub fn commit(self) -> Result<()> {
        if self.table != self.original {
            self.store.write_table(&self.table)?;
        }
        Ok(())
    }
}
