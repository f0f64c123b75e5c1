// src/process/terminate.rs

//! Graceful-then-forced termination of a task's process group.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::{ProcessProbe, StopSignal};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of [`terminate_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Last signal actually delivered, if any.
    pub signal: Option<StopSignal>,
    /// True when the process was still alive after SIGKILL and the grace wait.
    pub survived: bool,
}

impl Termination {
    /// Exit code to record: 128 + the last delivered signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.signal.map(StopSignal::exit_code)
    }
}

/// Stop the process group led by `pid`.
///
/// Sends SIGTERM, waits up to `grace` for every member of the group to go
/// away, then sends SIGKILL and waits up to `grace` once more. The caller
/// must already have verified that `pid` is still the task's process.
pub async fn terminate_group(probe: &dyn ProcessProbe, pid: u32, grace: Duration) -> Result<Termination> {
    if !probe.signal_group(pid, StopSignal::Term)? {
        debug!(pid, "process group already gone before SIGTERM");
        return Ok(Termination {
            signal: None,
            survived: false,
        });
    }
    info!(pid, "sent SIGTERM to process group");

    if wait_for_group_exit(probe, pid, grace).await? {
        return Ok(Termination {
            signal: Some(StopSignal::Term),
            survived: false,
        });
    }

    if !probe.signal_group(pid, StopSignal::Kill)? {
        // Exited between the last poll and SIGKILL.
        return Ok(Termination {
            signal: Some(StopSignal::Term),
            survived: false,
        });
    }
    warn!(pid, ?grace, "process group outlived SIGTERM; sent SIGKILL");

    let exited = wait_for_group_exit(probe, pid, grace).await?;
    Ok(Termination {
        signal: Some(StopSignal::Kill),
        survived: !exited,
    })
}

/// Poll until no member of group `pgid` is running or `limit` passes.
async fn wait_for_group_exit(probe: &dyn ProcessProbe, pgid: u32, limit: Duration) -> Result<bool> {
    let deadline = Instant::now() + limit;
    loop {
        if !probe.group_alive(pgid)? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
    }
}
