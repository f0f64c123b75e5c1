// src/process/mod.rs

//! Operating-system process inspection and signalling.
//!
//! Supervisor logic talks to a [`ProcessProbe`] instead of calling into the
//! OS directly. Production code uses [`SystemProbe`]; tests can provide a
//! scripted implementation that never touches real processes.

pub mod procfs;
pub mod terminate;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

pub use terminate::{Termination, terminate_group};

/// What the OS says about a pid right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// A live process we may signal. `start_ticks` is its kernel start time
    /// where the platform exposes it.
    Alive { start_ticks: Option<u64> },
    /// Exited but not yet reaped by its parent.
    Zombie,
    /// No process with this pid.
    Gone,
    /// A live process owned by someone else (`EPERM`). Never one of ours.
    Foreign,
}

impl ProcessState {
    /// Whether this state still denotes the process launched with
    /// `recorded_ticks`.
    ///
    /// Pids are recycled, so a live pid only counts when its start time
    /// matches the one captured at launch.
    pub fn is_same_process(&self, recorded_ticks: Option<u64>) -> bool {
        match (*self, recorded_ticks) {
            (ProcessState::Alive { start_ticks: Some(now) }, Some(then)) => now == then,
            (ProcessState::Alive { .. }, _) => true,
            _ => false,
        }
    }
}

/// Signals used to stop a task's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Term,
    Kill,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }

    /// Shell convention for a process terminated by this signal.
    pub fn exit_code(self) -> i32 {
        128 + self.as_nix() as i32
    }
}

pub trait ProcessProbe: Send + Sync {
    fn inspect(&self, pid: u32) -> Result<ProcessState>;

    /// Send `signal` to the process group led by `pid`.
    ///
    /// Returns `Ok(false)` when there is no such group left to signal.
    fn signal_group(&self, pid: u32, signal: StopSignal) -> Result<bool>;

    /// Whether any member of process group `pgid` is still running.
    ///
    /// The leader alone says nothing: it can exit while children that ignore
    /// SIGTERM keep the group alive. Zombies do not count.
    fn group_alive(&self, pgid: u32) -> Result<bool>;
}

/// Probe backed by `kill(2)` and, on Linux, `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn inspect(&self, pid: u32) -> Result<ProcessState> {
        let target = to_pid(pid)?;

        match signal::kill(target, None) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(ProcessState::Gone),
            Err(Errno::EPERM) => return Ok(ProcessState::Foreign),
            Err(e) => return Err(e).with_context(|| format!("probing pid {pid}")),
        }

        inspect_live(pid)
    }

    fn signal_group(&self, pid: u32, signal: StopSignal) -> Result<bool> {
        let target = to_pid(pid)?;
        match signal::killpg(target, signal.as_nix()) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("sending {signal:?} to process group {pid}")),
        }
    }

    fn group_alive(&self, pgid: u32) -> Result<bool> {
        let target = to_pid(pgid)?;
        match signal::killpg(target, None) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(false),
            // Members exist, we just may not signal all of them.
            Err(Errno::EPERM) => return Ok(true),
            Err(e) => return Err(e).with_context(|| format!("checking process group {pgid}")),
        }

        group_has_running_member(pgid)
    }
}

/// `killpg(pgid, 0)` also succeeds while only unreaped zombies remain, so
/// scan `/proc` for a member that is actually running.
#[cfg(target_os = "linux")]
fn group_has_running_member(pgid: u32) -> Result<bool> {
    let entries = std::fs::read_dir("/proc").context("listing /proc")?;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Processes come and go while we scan.
        let Ok(contents) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        if let Some(stat) = procfs::parse_stat(&contents) {
            if stat.pgrp == pgid && !stat.is_zombie() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(not(target_os = "linux"))]
fn group_has_running_member(_pgid: u32) -> Result<bool> {
    Ok(true)
}

#[cfg(target_os = "linux")]
fn inspect_live(pid: u32) -> Result<ProcessState> {
    use std::io::ErrorKind;

    let path = format!("/proc/{pid}/stat");
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        // Exited between kill(0) and the read.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ProcessState::Gone),
        Err(e) => return Err(e).with_context(|| format!("reading {path}")),
    };

    let stat = procfs::parse_stat(&contents)
        .with_context(|| format!("unparseable {path}"))?;

    if stat.is_zombie() {
        Ok(ProcessState::Zombie)
    } else {
        Ok(ProcessState::Alive {
            start_ticks: Some(stat.start_ticks),
        })
    }
}

#[cfg(not(target_os = "linux"))]
fn inspect_live(_pid: u32) -> Result<ProcessState> {
    Ok(ProcessState::Alive { start_ticks: None })
}

fn to_pid(pid: u32) -> Result<Pid> {
    // pid 0 and negative values address whole groups in kill(2).
    let raw = i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .with_context(|| format!("invalid pid {pid}"))?;
    Ok(Pid::from_raw(raw))
}
