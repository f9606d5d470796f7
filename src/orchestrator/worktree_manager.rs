//! Worktree manager: exclusive owner of every issue worktree
//!
//! Provisioning failures are returned to the caller. Releases are
//! best-effort: a failed release is logged and queued for the reaper instead
//! of failing the issue.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;
use crate::git::{
    add_worktree, attach_worktree, branch_exists, branch_name_for_issue, copy_ancillary_files,
    delete_branch, is_registered_worktree, prune_worktrees, remove_worktree, rev_parse,
};
use crate::models::{WorktreeHandle, WorktreeState};

pub struct WorktreeManager {
    repo_root: PathBuf,
    /// Absolute directory holding one worktree per issue
    root: PathBuf,
    copy_files: Vec<String>,
    handles: BTreeMap<String, WorktreeHandle>,
    /// Handles whose release failed, retried by [`WorktreeManager::reap`]
    reaper: Vec<WorktreeHandle>,
}

impl WorktreeManager {
    pub fn new(repo_root: &Path, root: &Path, copy_files: Vec<String>) -> Self {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            repo_root.join(root)
        };
        Self {
            repo_root: repo_root.to_path_buf(),
            root,
            copy_files,
            handles: BTreeMap::new(),
            reaper: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, issue_id: &str) -> PathBuf {
        WorktreeHandle::worktree_path(&self.root, issue_id)
    }

    /// Create the root and hide it from the main checkout's status
    fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let gitignore = self.root.join(".gitignore");
        if !gitignore.exists() {
            std::fs::write(&gitignore, "*\n")
                .with_context(|| format!("Failed to write {}", gitignore.display()))?;
        }
        Ok(())
    }

    /// Create a fresh worktree for `issue_id` branched from `base`.
    ///
    /// Any handle or leftover directory for the same issue is released first.
    pub fn provision(
        &mut self,
        issue_id: &str,
        base: &str,
    ) -> Result<WorktreeHandle, OrchestratorError> {
        self.provision_inner(issue_id, base)
            .map_err(|e| OrchestratorError::WorktreeCreation {
                issue_id: issue_id.to_string(),
                message: format!("{e:#}"),
            })
    }

    fn provision_inner(&mut self, issue_id: &str, base: &str) -> Result<WorktreeHandle> {
        self.ensure_root()?;

        if self.handles.contains_key(issue_id) {
            debug!(issue_id, "Releasing previous handle before re-provisioning");
            self.release(issue_id);
        }

        let path = self.path_for(issue_id);
        let branch = branch_name_for_issue(issue_id);
        if path.exists() {
            info!(issue_id, path = %path.display(), "Removing stale worktree");
            remove_worktree(&self.repo_root, &path)?;
            prune_worktrees(&self.repo_root)?;
        }

        let base_commit = rev_parse(base, &self.repo_root)
            .with_context(|| format!("Failed to resolve base {base}"))?;
        let mut handle =
            WorktreeHandle::new(issue_id.to_string(), path.clone(), branch.clone(), base_commit);

        add_worktree(&self.repo_root, &path, &branch, &handle.base_commit)?;

        if let Err(e) = copy_ancillary_files(&self.repo_root, &path, &self.copy_files) {
            handle.mark_failed();
            self.destroy(&handle).ok();
            return Err(e);
        }

        handle.mark_ready();
        info!(issue_id, path = %path.display(), branch = %branch, "Provisioned worktree");
        self.handles.insert(issue_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Reuse the worktree of an issue whose branch survived a crash.
    ///
    /// The branch is kept as-is; only the checkout is recreated if needed.
    pub fn adopt(&mut self, issue_id: &str) -> Result<WorktreeHandle, OrchestratorError> {
        self.adopt_inner(issue_id)
            .map_err(|e| OrchestratorError::WorktreeCreation {
                issue_id: issue_id.to_string(),
                message: format!("{e:#}"),
            })
    }

    fn adopt_inner(&mut self, issue_id: &str) -> Result<WorktreeHandle> {
        self.ensure_root()?;
        let path = self.path_for(issue_id);
        let branch = branch_name_for_issue(issue_id);

        if !path.exists() || !is_registered_worktree(&self.repo_root, &path)? {
            if path.exists() {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            prune_worktrees(&self.repo_root)?;
            attach_worktree(&self.repo_root, &path, &branch)?;
        }

        let head = rev_parse("HEAD", &path)?;
        let mut handle = WorktreeHandle::new(issue_id.to_string(), path, branch, head);
        handle.mark_ready();
        info!(issue_id, "Adopted worktree from previous run");
        self.handles.insert(issue_id.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn mark(&mut self, issue_id: &str, state: WorktreeState) {
        if let Some(handle) = self.handles.get_mut(issue_id) {
            match state {
                WorktreeState::InUse => handle.mark_in_use(),
                WorktreeState::Merging => handle.mark_merging(),
                WorktreeState::Ready => handle.mark_ready(),
                WorktreeState::Failed => handle.mark_failed(),
                WorktreeState::Released => handle.mark_released(),
                WorktreeState::Provisioning => {}
            }
        }
    }

    /// Release an issue's worktree: directory, branch, registry entry.
    ///
    /// Never fails; problems are logged and the handle goes to the reaper.
    /// Returns whether the release completed now.
    pub fn release(&mut self, issue_id: &str) -> bool {
        let Some(mut handle) = self.handles.remove(issue_id) else {
            return true;
        };

        match self.destroy(&handle) {
            Ok(()) => {
                handle.mark_released();
                debug!(issue_id, "Released worktree");
                true
            }
            Err(e) => {
                warn!(issue_id, error = %format!("{e:#}"), "Worktree release failed, queued for reaper");
                handle.mark_failed();
                self.reaper.push(handle);
                false
            }
        }
    }

    fn destroy(&self, handle: &WorktreeHandle) -> Result<()> {
        remove_worktree(&self.repo_root, &handle.path)?;
        prune_worktrees(&self.repo_root)?;
        if branch_exists(&handle.branch_name, &self.repo_root) {
            delete_branch(&handle.branch_name, &self.repo_root)?;
        }
        Ok(())
    }

    /// Retry queued releases; returns how many are still pending
    pub fn reap(&mut self) -> usize {
        let queued = std::mem::take(&mut self.reaper);
        for mut handle in queued {
            match self.destroy(&handle) {
                Ok(()) => {
                    handle.mark_released();
                    info!(issue_id = %handle.issue_id, "Reaper released worktree");
                }
                Err(e) => {
                    warn!(issue_id = %handle.issue_id, error = %format!("{e:#}"), "Reaper could not release worktree");
                    self.reaper.push(handle);
                }
            }
        }
        self.reaper.len()
    }

    /// Release every handle still held, then reap
    pub fn release_all(&mut self) -> usize {
        let ids: Vec<String> = self.handles.keys().cloned().collect();
        for id in ids {
            self.release(&id);
        }
        self.reap()
    }

    /// Remove every worktree directory left under the root.
    ///
    /// Branches are deleted only for issues in `release_branches`; other
    /// branches stay so a later run can resume from them.
    pub fn sweep_directories(&mut self, release_branches: &BTreeSet<String>) -> Result<usize> {
        let mut removed = 0;
        for issue_id in self.directories_on_disk()? {
            self.handles.remove(&issue_id);
            self.remove_directory(&issue_id, release_branches.contains(&issue_id))?;
            removed += 1;
        }
        self.reaper.clear();
        prune_worktrees(&self.repo_root)?;
        Ok(removed)
    }

    /// Remove one issue's worktree directory, optionally with its branch
    pub fn remove_directory(&self, issue_id: &str, with_branch: bool) -> Result<()> {
        remove_worktree(&self.repo_root, &self.path_for(issue_id))?;
        prune_worktrees(&self.repo_root)?;
        let branch = branch_name_for_issue(issue_id);
        if with_branch && branch_exists(&branch, &self.repo_root) {
            delete_branch(&branch, &self.repo_root)?;
        }
        Ok(())
    }

    /// Issue ids with a directory under the root
    pub fn directories_on_disk(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Handles currently held
    pub fn live_count(&self) -> usize {
        self.handles.len()
    }
}
