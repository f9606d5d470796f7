//! Git operations for issue worktrees
//!
//! This module provides:
//! - A git command runner with consistent error context
//! - Issue branch naming and ref queries
//! - Worktree creation, removal, and registry parsing
//! - Rebase and integration of finished issue branches
//! - Working-tree status for leak detection

pub mod branch;
pub mod merge;
pub mod runner;
pub mod status;
pub mod worktree;

pub use branch::{
    branch_exists, branch_name_for_issue, current_branch, default_branch, delete_branch,
    is_ancestor, issue_id_from_branch, list_issue_branches, rev_parse, BRANCH_PREFIX,
};
pub use merge::{
    changed_files, conflicting_files, integrate_branch, mentions_index_lock, rebase_onto,
    RebaseOutcome,
};
pub use runner::{check_git_available, repo_toplevel};
pub use status::{checkout_paths, commit_all, dirty_paths};
pub use worktree::{
    add_worktree, attach_worktree, copy_ancillary_files, is_registered_worktree, list_worktrees,
    prune_worktrees, remove_worktree, WorktreeInfo,
};
