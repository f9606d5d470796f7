//! Cross-process merge lock file

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

/// A lock file older than this is assumed to belong to a dead process
const STALE_LOCK_AGE: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive `merge.lock` file; removed on drop
#[derive(Debug)]
pub struct MergeLock {
    path: PathBuf,
    held: bool,
}

impl MergeLock {
    /// Acquire the lock, waiting up to `timeout` for another holder
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if start.elapsed() >= timeout {
                bail!(
                    "Timed out after {}s waiting for merge lock {}",
                    timeout.as_secs(),
                    path.display()
                );
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "pid={}", std::process::id())?;
                writeln!(file, "timestamp={}", chrono::Utc::now().to_rfc3339())?;
                file.sync_all()?;
                Ok(Some(Self {
                    path: path.to_path_buf(),
                    held: true,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if is_stale(path) {
                    warn!(path = %path.display(), "Removing stale merge lock");
                    fs::remove_file(path).ok();
                }
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to create merge lock {}", path.display())),
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| {
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO)
                > STALE_LOCK_AGE
        })
        .unwrap_or(false)
}

impl Drop for MergeLock {
    fn drop(&mut self) {
        if self.held {
            fs::remove_file(&self.path).ok();
            self.held = false;
        }
    }
}
