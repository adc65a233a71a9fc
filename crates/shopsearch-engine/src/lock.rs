//! Single-writer guard for full index rebuilds.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use shopsearch_core::{Error, Result};

pub const LOCK_FILE: &str = ".rebuild.lock";

/// A lock file next to the index. Creation is atomic (`create_new`), so two
/// rebuilds, in one process or across processes, cannot both hold it.
#[derive(Debug, Clone)]
pub struct RebuildLock {
    path: PathBuf,
}

impl RebuildLock {
    pub fn in_dir(dir: &Path) -> Self {
        Self { path: dir.join(LOCK_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_acquire(&self) -> Result<RebuildGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut f) => {
                // the guard owns the file from here, so a failed write still removes it
                let guard = RebuildGuard { path: self.path.clone() };
                writeln!(f, "{}", std::process::id())?;
                Ok(guard)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&self.path).unwrap_or_default();
                Err(Error::IndexConsistency(format!(
                    "another rebuild holds {} (pid {}); remove the file if that process is gone",
                    self.path.display(),
                    holder.trim()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Releases the lock when dropped.
#[derive(Debug)]
pub struct RebuildGuard {
    path: PathBuf,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release rebuild lock");
        }
    }
}
