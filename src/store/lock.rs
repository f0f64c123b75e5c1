// src/store/lock.rs

//! Advisory lock guarding the task table across processes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::errors::Result;

/// Scoped `flock` on the store's lock file.
///
/// Released when dropped, on every exit path. If the holder crashes the
/// kernel drops the lock with the file descriptor, so there is no staleness
/// to detect.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Block until an exclusive lock is held.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("acquiring exclusive lock on {:?}", path))?;
        debug!(path = ?path, "acquired exclusive store lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Block until a shared lock is held.
    pub fn shared(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_shared(&file)
            .with_context(|| format!("acquiring shared lock on {:?}", path))?;
        debug!(path = ?path, "acquired shared store lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = ?self.path, error = %e, "failed to release store lock");
        } else {
            debug!(path = ?self.path, "released store lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening lock file {:?}", path))?;
    Ok(file)
}
