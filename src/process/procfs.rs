// src/process/procfs.rs

//! Minimal `/proc/<pid>/stat` parsing.

/// The fields of `/proc/<pid>/stat` ralph cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    /// Single-letter scheduler state (`R`, `S`, `Z`, ...).
    pub state: char,
    /// Field 5: process group id.
    pub pgrp: u32,
    /// Field 22: start time in clock ticks since boot.
    pub start_ticks: u64,
}

impl ProcStat {
    pub fn is_zombie(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse the contents of a stat file.
///
/// The command name (field 2) is parenthesised and may itself contain spaces
/// or parentheses, so fields are counted from the last `") "`.
pub fn parse_stat(contents: &str) -> Option<ProcStat> {
    let (_, tail) = contents.rsplit_once(") ")?;
    let mut fields = tail.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    let start_ticks = fields.nth(16)?.parse().ok()?;
    Some(ProcStat {
        state,
        pgrp,
        start_ticks,
    })
}
