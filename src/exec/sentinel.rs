// src/exec/sentinel.rs

//! Exit-code capture for processes we are not the parent of.
//!
//! Later invocations cannot `waitpid` a task launched by an earlier one, so
//! every task runs under a small `sh` wrapper that writes the command's exit
//! code to `<id>.exit` once it finishes. The write goes through a temp file
//! and `mv`, so a reader sees either no sentinel or a complete one.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

/// `$0` of the wrapper shell, visible in `ps` output.
pub const WRAPPER_ARGV0: &str = "ralph-wrapper";

/// Wrapper body. `$1` is the user command, `$2` the sentinel path.
pub const WRAPPER_SCRIPT: &str = r#"sh -c "$1"
code=$?
printf '%s\n' "$code" > "$2.tmp" && mv -f "$2.tmp" "$2"
exit "$code""#;

/// Read the exit code recorded at `path`, if the task has finished.
pub fn read_exit_code(path: &Path) -> Result<Option<i32>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading exit sentinel {:?}", path)),
    };

    let trimmed = contents.trim();
    trimmed
        .parse::<i32>()
        .map(Some)
        .map_err(|_| anyhow!("exit sentinel {:?} holds {:?}, not an exit code", path, trimmed))
}
