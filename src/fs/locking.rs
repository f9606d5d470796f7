//! Advisory locks shared between weave processes
//!
//! Uses `fs2` locks, which the OS releases if the holder dies, so a crashed
//! run never leaves the repository locked.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::OrchestratorError;

/// Exclusive claim on a repository for the duration of one run.
///
/// Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting.
    ///
    /// Fails with [`OrchestratorError::RunLocked`] when another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        #[allow(clippy::suspicious_open_options)]
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(OrchestratorError::RunLocked(path.to_path_buf()).into());
        }

        file.set_len(0)
            .with_context(|| format!("Failed to truncate lock file: {}", path.display()))?;
        writeln!(file, "pid={}", std::process::id())?;
        writeln!(file, "started={}", chrono::Utc::now().to_rfc3339())?;
        file.sync_all()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Whether some process currently holds the lock at `path`
    pub fn is_held(path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().read(true).write(true).open(path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
