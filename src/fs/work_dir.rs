//! The `.work/` directory holding run state and locks

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORK_DIR_NAME: &str = ".work";

/// Paths under `<repo>/.work/`
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new<P: AsRef<Path>>(repo_root: P) -> Self {
        Self {
            root: repo_root.as_ref().join(WORK_DIR_NAME),
        }
    }

    /// Create the directory (and a `.gitignore` that hides it) if missing
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let gitignore = self.root.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*\n")
                .with_context(|| format!("Failed to write {}", gitignore.display()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("run-state.yaml")
    }

    pub fn run_lock_file(&self) -> PathBuf {
        self.root.join("run.lock")
    }

    pub fn merge_lock_file(&self) -> PathBuf {
        self.root.join("merge.lock")
    }
}
