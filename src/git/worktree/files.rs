//! Copy untracked ancillary files into a fresh worktree

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Copy each allow-listed file that exists in the main checkout.
///
/// Missing sources are skipped. Returns the paths that were copied.
pub fn copy_ancillary_files(
    repo_root: &Path,
    worktree_path: &Path,
    files: &[String],
) -> Result<Vec<String>> {
    let mut copied = Vec::new();

    for file in files {
        let source = repo_root.join(file);
        if !source.is_file() {
            debug!(file = %file, "Ancillary file not present, skipping");
            continue;
        }

        let dest = worktree_path.join(file);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::copy(&source, &dest).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), dest.display())
        })?;
        copied.push(file.clone());
    }

    Ok(copied)
}
