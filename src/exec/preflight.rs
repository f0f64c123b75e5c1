// src/exec/preflight.rs

//! Static checks run before a command is handed to the shell.
//!
//! Once `sh` has started, a missing program only shows up as exit code 127
//! in the log. Catching the obvious cases up front lets `--run` fail
//! synchronously instead of recording a task that was never going to start.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Words `sh` handles itself; never looked up on `PATH`.
const SHELL_WORDS: &[&str] = &[
    "!", ".", ":", "[", "[[", "alias", "bg", "break", "case", "cd", "command", "continue",
    "eval", "exec", "exit", "export", "false", "fg", "for", "function", "getopts", "hash",
    "if", "jobs", "kill", "local", "printf", "pwd", "read", "readonly", "return", "set",
    "shift", "source", "test", "times", "trap", "true", "type", "ulimit", "umask", "unalias",
    "unset", "until", "wait", "while", "echo", "{", "(",
];

/// Reasons a command is rejected before spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NotFound(String),
    NotExecutable(PathBuf),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty command"),
            Rejection::NotFound(p) => write!(f, "command not found: {p}"),
            Rejection::NotExecutable(p) => write!(f, "permission denied: {}", p.display()),
        }
    }
}

/// Check that the first program word of `command` can be started from `cwd`.
///
/// Commands whose first word is shell syntax, a builtin, or cannot be
/// tokenised are let through; the shell is the authority for those.
pub fn check_command(command: &str, cwd: &Path) -> Result<(), Rejection> {
    if command.trim().is_empty() {
        return Err(Rejection::Empty);
    }

    let Some(words) = shlex::split(command) else {
        debug!(command, "command not tokenisable; leaving it to the shell");
        return Ok(());
    };

    let Some(program) = words.into_iter().find(|w| !is_assignment(w)) else {
        // Only `VAR=value` words.
        return Ok(());
    };

    if SHELL_WORDS.contains(&program.as_str()) || has_shell_syntax(&program) {
        return Ok(());
    }

    if program.contains('/') {
        let path = cwd.join(&program);
        if !path.exists() {
            return Err(Rejection::NotFound(program));
        }
        if !is_executable(&path) {
            return Err(Rejection::NotExecutable(path));
        }
        return Ok(());
    }

    match which::which(&program) {
        Ok(found) => {
            debug!(program, path = ?found, "resolved program on PATH");
            Ok(())
        }
        Err(_) => Err(Rejection::NotFound(program)),
    }
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn has_shell_syntax(word: &str) -> bool {
    word.contains(['$', '`', '(', ')', ';', '&', '|', '<', '>', '*', '?', '~', '{', '}'])
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn here() -> PathBuf {
        PathBuf::from(".")
    }

    #[test]
    fn accepts_programs_on_path_and_builtins() {
        assert_eq!(check_command("sh -c 'exit 0'", &here()), Ok(()));
        assert_eq!(check_command("sleep 1 && exit 0", &here()), Ok(()));
        assert_eq!(check_command("cd /tmp && ls", &here()), Ok(()));
        assert_eq!(check_command("FOO=bar sh -c true", &here()), Ok(()));
        assert_eq!(check_command("(echo sub)", &here()), Ok(()));
    }

    #[test]
    fn rejects_empty_and_unknown_programs() {
        assert_eq!(check_command("   ", &here()), Err(Rejection::Empty));
        assert_eq!(
            check_command("definitely-not-a-real-program-ralph --flag", &here()),
            Err(Rejection::NotFound(
                "definitely-not-a-real-program-ralph".to_string()
            ))
        );
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\necho ok\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(matches!(
            check_command("./run.sh", dir.path()),
            Err(Rejection::NotExecutable(_))
        ));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(check_command("./run.sh", dir.path()), Ok(()));
        assert!(matches!(
            check_command("./missing.sh", dir.path()),
            Err(Rejection::NotFound(_))
        ));
    }

    #[test]
    fn assignment_detection() {
        assert!(is_assignment("RUST_LOG=debug"));
        assert!(!is_assignment("--opt=1"));
        assert!(!is_assignment("1X=2"));
        assert!(!is_assignment("plain"));
    }
}
