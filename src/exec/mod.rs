// src/exec/mod.rs

//! Process launching layer.
//!
//! - [`launcher`] spawns a task as a detached session leader and records it.
//! - [`sentinel`] holds the `sh` wrapper that writes each task's exit code
//!   beside its log, and the reader for that file.
//! - [`preflight`] rejects commands that obviously cannot start.

pub mod launcher;
pub mod preflight;
pub mod sentinel;

pub use launcher::{LaunchRequest, launch};
pub use sentinel::read_exit_code;
