#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use ralph::config::ConfigFile;
use ralph::process::{ProcessProbe, SystemProbe};
use ralph::store::{TaskRecord, TaskStore};
use ralph::supervisor::Supervisor;
use ralph::types::{TaskId, TaskStatus};

pub use ralph_test_utils::{FakeProbe, TaskRecordBuilder, init_tracing, wait_for, with_timeout};

/// Config rooted at `dir` with a short kill grace so tests stay fast.
pub fn test_config(dir: &Path) -> ConfigFile {
    ConfigFile {
        state_dir: dir.to_path_buf(),
        default_timeout: None,
        retention: Duration::from_secs(60 * 60),
        kill_grace: Duration::from_millis(500),
    }
}

pub fn system_supervisor(dir: &Path) -> Supervisor<SystemProbe> {
    Supervisor::from_config(test_config(dir), SystemProbe).expect("open store")
}

pub fn fake_supervisor(dir: &Path, probe: FakeProbe) -> Supervisor<FakeProbe> {
    Supervisor::from_config(test_config(dir), probe).expect("open store")
}

/// Write `records` straight into the store, bypassing the launcher.
pub fn seed(store: &TaskStore, records: Vec<TaskRecord>) {
    store.save(records).expect("seed store");
}

/// Write an exit sentinel for `record` as the wrapper would.
pub fn write_sentinel(record: &TaskRecord, code: i32) {
    std::fs::write(record.sentinel_path(), format!("{code}\n")).expect("write sentinel");
}

pub fn find<'a>(records: &'a [TaskRecord], id: &TaskId) -> &'a TaskRecord {
    records
        .iter()
        .find(|r| &r.id == id)
        .unwrap_or_else(|| panic!("no record {id}"))
}

/// Poll `check` until `id` reaches a terminal state or `limit` elapses.
pub async fn wait_until_terminal<P: ProcessProbe>(
    sup: &Supervisor<P>,
    id: &TaskId,
    limit: Duration,
) -> TaskRecord {
    let done = wait_for(limit, || async move {
        let (record, _) = sup.check(id).await.expect("check");
        record.status != TaskStatus::Running
    })
    .await;
    assert!(done, "{id} still running after {limit:?}");
    sup.check(id).await.expect("check").0
}
