//! Git worktree plumbing
//!
//! Lifecycle policy (who owns a worktree, when it is released) lives in the
//! orchestrator's worktree manager; this module only talks to git.

mod files;
mod operations;
mod parser;

pub use files::copy_ancillary_files;
pub use operations::{
    add_worktree, attach_worktree, is_registered_worktree, list_worktrees, prune_worktrees,
    remove_worktree,
};
pub use parser::{parse_worktree_list, WorktreeInfo};
