use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use ralph::process::{ProcessProbe, ProcessState, StopSignal};
use tracing::debug;

/// How a fake process reacts to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Exit,
    Ignore,
}

#[derive(Debug, Clone)]
struct FakeProcess {
    state: ProcessState,
    on_term: Reaction,
    on_kill: Reaction,
    /// Other group members that outlive the leader until SIGKILL.
    stragglers: bool,
    /// The group disappears right before the first signal reaches it.
    vanish_before_signal: bool,
    inspect_error: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    procs: HashMap<u32, FakeProcess>,
    signals: Vec<(u32, StopSignal)>,
}

/// A scripted [`ProcessProbe`] that never touches real processes.
///
/// - unknown pids are `Gone`
/// - live processes exit on SIGTERM unless told otherwise
/// - a group is alive while its leader is, or while stragglers remain
/// - every delivered signal is recorded
///
/// Clones share state, so a test can keep a handle after moving one into a
/// `Supervisor`.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    inner: Arc<Mutex<Inner>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(state: ProcessState) -> FakeProcess {
        FakeProcess {
            state,
            on_term: Reaction::Exit,
            on_kill: Reaction::Exit,
            stragglers: false,
            vanish_before_signal: false,
            inspect_error: None,
        }
    }

    fn set(&self, pid: u32, state: ProcessState) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .procs
            .entry(pid)
            .and_modify(|p| {
                p.state = state;
                p.inspect_error = None;
            })
            .or_insert_with(|| Self::fresh(state));
    }

    pub fn alive(&self, pid: u32, start_ticks: u64) {
        self.set(
            pid,
            ProcessState::Alive {
                start_ticks: Some(start_ticks),
            },
        );
    }

    pub fn gone(&self, pid: u32) {
        self.set(pid, ProcessState::Gone);
    }

    pub fn zombie(&self, pid: u32) {
        self.set(pid, ProcessState::Zombie);
    }

    pub fn foreign(&self, pid: u32) {
        self.set(pid, ProcessState::Foreign);
    }

    /// The process survives SIGTERM and only dies on SIGKILL.
    pub fn ignore_term(&self, pid: u32) {
        if let Some(p) = self.inner.lock().unwrap().procs.get_mut(&pid) {
            p.on_term = Reaction::Ignore;
        }
    }

    /// The process survives both SIGTERM and SIGKILL.
    pub fn unkillable(&self, pid: u32) {
        if let Some(p) = self.inner.lock().unwrap().procs.get_mut(&pid) {
            p.on_term = Reaction::Ignore;
            p.on_kill = Reaction::Ignore;
        }
    }

    /// The leader exits on SIGTERM, but other members of its group ignore
    /// it and keep the group alive until SIGKILL.
    pub fn stragglers_ignore_term(&self, pid: u32) {
        if let Some(p) = self.inner.lock().unwrap().procs.get_mut(&pid) {
            p.stragglers = true;
        }
    }

    /// The group exits on its own between reconciliation and SIGTERM.
    pub fn vanishes_before_signal(&self, pid: u32) {
        if let Some(p) = self.inner.lock().unwrap().procs.get_mut(&pid) {
            p.vanish_before_signal = true;
        }
    }

    /// Make every `inspect(pid)` and `group_alive(pid)` fail with `reason`.
    ///
    /// A pid already scripted keeps its state, so signals would still reach
    /// it; an unknown pid is added as `Gone`.
    pub fn fail_inspect(&self, pid: u32, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        let p = inner
            .procs
            .entry(pid)
            .or_insert_with(|| Self::fresh(ProcessState::Gone));
        p.inspect_error = Some(reason.to_string());
    }

    /// Signals delivered so far, in order.
    pub fn signals(&self) -> Vec<(u32, StopSignal)> {
        self.inner.lock().unwrap().signals.clone()
    }
}

impl ProcessProbe for FakeProbe {
    fn inspect(&self, pid: u32) -> Result<ProcessState> {
        let inner = self.inner.lock().unwrap();
        match inner.procs.get(&pid) {
            Some(FakeProcess {
                inspect_error: Some(reason),
                ..
            }) => Err(anyhow!("inspecting pid {pid}: {reason}")),
            Some(p) => Ok(p.state),
            None => Ok(ProcessState::Gone),
        }
    }

    fn signal_group(&self, pid: u32, signal: StopSignal) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(proc_) = inner.procs.get_mut(&pid) else {
            return Ok(false);
        };
        if proc_.vanish_before_signal {
            proc_.state = ProcessState::Gone;
            proc_.stragglers = false;
            return Ok(false);
        }
        match proc_.state {
            ProcessState::Alive { .. } => {}
            ProcessState::Foreign => return Err(anyhow!("killpg({pid}): EPERM")),
            ProcessState::Zombie | ProcessState::Gone if proc_.stragglers => {}
            ProcessState::Zombie | ProcessState::Gone => return Ok(false),
        }

        let reaction = match signal {
            StopSignal::Term => proc_.on_term,
            StopSignal::Kill => proc_.on_kill,
        };
        if reaction == Reaction::Exit {
            proc_.state = ProcessState::Gone;
            if signal == StopSignal::Kill {
                proc_.stragglers = false;
            }
        }
        debug!(pid, ?signal, ?reaction, "fake process signalled");
        inner.signals.push((pid, signal));
        Ok(true)
    }

    fn group_alive(&self, pgid: u32) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        match inner.procs.get(&pgid) {
            Some(FakeProcess {
                inspect_error: Some(reason),
                ..
            }) => Err(anyhow!("scanning group {pgid}: {reason}")),
            Some(p) => Ok(matches!(p.state, ProcessState::Alive { .. }) || p.stragglers),
            None => Ok(false),
        }
    }
}
